use crate::common::SCHEMATA_EVENT;
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use std::marker::PhantomData;
use std::sync::Arc;

/// Fan-out of engine notifications to listeners of type `L`.
///
/// Wraps a `basu` bus under the single [`SCHEMATA_EVENT`] topic. Publishing
/// is skipped when nobody is subscribed, so callers may publish freely.
///
/// ```ignore
/// let alerts: SchemataEventBus<EngineEventInfo, EngineEventListener> = SchemataEventBus::new();
/// let receipt = alerts.register(listener)?;
/// alerts.publish(info)?;
/// alerts.deregister(receipt.unwrap())?;
/// ```
pub struct SchemataEventBus<E, L> {
    bus: Arc<EventBus<E>>,
    listener: PhantomData<fn(L)>,
}

impl<E, L> Clone for SchemataEventBus<E, L> {
    fn clone(&self) -> Self {
        SchemataEventBus {
            bus: self.bus.clone(),
            listener: PhantomData,
        }
    }
}

impl<E, L> Default for SchemataEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> SchemataEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    pub fn new() -> Self {
        SchemataEventBus {
            bus: Arc::new(EventBus::new()),
            listener: PhantomData,
        }
    }

    /// Subscribes `listener`; the receipt is needed to remove it again.
    pub fn register(&self, listener: L) -> SchemataResult<Option<SubscriberRef>> {
        let id = self
            .bus
            .subscribe(SCHEMATA_EVENT, Box::new(listener))
            .map_err(bus_failure)?;
        Ok(Some(SubscriberRef { inner: id }))
    }

    pub fn deregister(&self, subscriber: SubscriberRef) -> SchemataResult<()> {
        self.bus
            .unsubscribe(SCHEMATA_EVENT, &subscriber.inner)
            .map(|_| ())
            .map_err(bus_failure)
    }

    /// Delivers `event` to every current subscriber. A listener error comes back
    /// as [`ErrorKind::EventError`].
    pub fn publish(&self, event: E) -> SchemataResult<()> {
        if !self.has_listeners() {
            return Ok(());
        }
        self.bus
            .publish(SCHEMATA_EVENT, &Event::new(event))
            .map(|_| ())
            .map_err(bus_failure)
    }

    pub fn has_listeners(&self) -> bool {
        match self.bus.get_handler_count(SCHEMATA_EVENT) {
            Ok(count) => count > 0,
            Err(BasuError::EventTypeNotFOUND) => false,
            Err(e) => {
                log::warn!("Could not count event listeners: {}", e);
                false
            }
        }
    }
}

/// Receipt for a registered listener.
pub struct SubscriberRef {
    pub(crate) inner: HandlerId,
}

fn bus_failure(e: BasuError) -> SchemataError {
    let message = match e {
        BasuError::EventTypeNotFOUND => "no listener registered for engine events".to_string(),
        BasuError::MutexPoisoned => "listener registry lock poisoned".to_string(),
        BasuError::HandlerError(cause) => match cause.downcast_ref::<SchemataError>() {
            Some(inner) => format!("listener failed: {}", inner.message()),
            None => format!("listener failed: {}", cause),
        },
    };
    log::error!("{}", message);
    SchemataError::new(&message, ErrorKind::EventError)
}
