use super::collection::MemoryCollection;
use super::connection::InMemoryConnection;
use crate::common::{atomic, Atomic, SchemataEventBus, INITIAL_STORE_VERSION};
use crate::engine::{EngineEventInfo, EngineEventListener, EngineEvents};
use im::OrdMap;

/// Committed state of one store.
pub(crate) struct StoreData {
    pub(crate) version: u32,
    pub(crate) collections: OrdMap<String, MemoryCollection>,
    pub(crate) upgrading: bool,
    pub(crate) deleted: bool,
    pub(crate) connections: Vec<InMemoryConnection>,
}

pub(crate) struct MemoryStore {
    identifier: String,
    pub(crate) data: Atomic<StoreData>,
}

impl MemoryStore {
    pub(crate) fn new(identifier: &str) -> Self {
        MemoryStore {
            identifier: identifier.to_string(),
            data: atomic(StoreData {
                version: INITIAL_STORE_VERSION,
                collections: OrdMap::new(),
                upgrading: false,
                deleted: false,
                connections: Vec::new(),
            }),
        }
    }

    pub(crate) fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Publishes engine events. Callers never hold a store lock while alerting.
#[derive(Clone)]
pub(crate) struct EngineAlerts {
    event_bus: SchemataEventBus<EngineEventInfo, EngineEventListener>,
}

impl EngineAlerts {
    pub(crate) fn new(event_bus: SchemataEventBus<EngineEventInfo, EngineEventListener>) -> Self {
        EngineAlerts { event_bus }
    }

    pub(crate) fn event_bus(&self) -> &SchemataEventBus<EngineEventInfo, EngineEventListener> {
        &self.event_bus
    }

    /// Listener failures are logged and never undo the storage operation that
    /// triggered the event.
    pub(crate) fn alert(&self, event: EngineEvents, identifier: &str, old_version: u32, new_version: u32) {
        if !self.event_bus.has_listeners() {
            return;
        }

        let info = EngineEventInfo::new(event, identifier, old_version, new_version);
        if let Err(e) = self.event_bus.publish(info) {
            log::warn!("Failed to publish {:?} for store {}: {}", event, identifier, e);
        }
    }
}
