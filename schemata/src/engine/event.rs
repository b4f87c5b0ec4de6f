use crate::errors::SchemataResult;
use anyhow::Error;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Lifecycle events published by a storage engine.
///
/// ```ignore
/// let listener = EngineEventListener::new(|info| {
///     if info.event() == EngineEvents::Blocked {
///         log::warn!("upgrade of {} is waiting on open connections", info.identifier());
///     }
///     Ok(())
/// });
/// let config = InMemoryEngineConfig::new();
/// config.add_engine_listener(listener);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EngineEvents {
    /// A connection was handed out at the stored version.
    Opened,
    /// A version-change transaction was granted.
    UpgradeStarted,
    /// A version-change transaction committed.
    Committed,
    /// A version-change transaction rolled back.
    Aborted,
    /// An upgrade or delete was refused because other connections stayed open.
    Blocked,
    /// A connection was closed.
    Closed,
    /// A store was deleted.
    Deleted,
}

/// Payload of an engine event.
///
/// For `Opened` and `Closed` both versions are the connection's version. For the
/// upgrade events `old_version` is the stored version before the attempt and
/// `new_version` the requested one. For `Deleted`, `new_version` is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEventInfo {
    event: EngineEvents,
    identifier: String,
    old_version: u32,
    new_version: u32,
}

impl EngineEventInfo {
    pub fn new(event: EngineEvents, identifier: &str, old_version: u32, new_version: u32) -> Self {
        EngineEventInfo {
            event,
            identifier: identifier.to_string(),
            old_version,
            new_version,
        }
    }

    pub fn event(&self) -> EngineEvents {
        self.event
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }
}

pub trait EngineEventCallback: Send + Sync + Fn(EngineEventInfo) -> SchemataResult<()> {}

impl<F> EngineEventCallback for F where F: Send + Sync + Fn(EngineEventInfo) -> SchemataResult<()> {}

#[derive(Clone)]
pub struct EngineEventListener {
    on_event: Arc<dyn EngineEventCallback>,
}

impl EngineEventListener {
    pub fn new(on_event: impl EngineEventCallback + 'static) -> Self {
        EngineEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<EngineEventInfo> for EngineEventListener {
    fn handle(&self, event: &Event<EngineEventInfo>) -> Result<(), BasuError> {
        match (self.on_event)(event.data.clone()) {
            Ok(_) => Ok(()),
            Err(e) => Err(BasuError::HandlerError(Error::from(e))),
        }
    }
}

impl Debug for EngineEventListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEventListener").finish()
    }
}

/// Sent to every open connection of a store when another opener asks for a newer
/// version (or for deletion, with `new_version == None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChangeEvent {
    pub identifier: String,
    pub old_version: u32,
    pub new_version: Option<u32>,
}

pub trait VersionChangeCallback: Send + Sync + Fn(VersionChangeEvent) -> SchemataResult<()> {}

impl<F> VersionChangeCallback for F where F: Send + Sync + Fn(VersionChangeEvent) -> SchemataResult<()> {}

/// Connection-level listener, invoked synchronously by the engine before it decides
/// whether an upgrade is blocked. Closing the connection from inside the callback
/// unblocks the upgrade.
#[derive(Clone)]
pub struct VersionChangeListener {
    on_change: Arc<dyn VersionChangeCallback>,
}

impl VersionChangeListener {
    pub fn new(on_change: impl VersionChangeCallback + 'static) -> Self {
        VersionChangeListener {
            on_change: Arc::new(on_change),
        }
    }

    pub fn notify(&self, event: VersionChangeEvent) -> SchemataResult<()> {
        (self.on_change)(event)
    }
}

impl Debug for VersionChangeListener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionChangeListener").finish()
    }
}
