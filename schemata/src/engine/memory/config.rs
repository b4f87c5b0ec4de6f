use crate::common::{atomic, Atomic, Locked};
use crate::engine::EngineEventListener;
use std::sync::Arc;

/// Settings of an [`InMemoryEngine`](super::InMemoryEngine).
#[derive(Default, Clone)]
pub struct InMemoryEngineConfig {
    inner: Arc<InMemoryEngineConfigInner>,
}

impl InMemoryEngineConfig {
    pub fn new() -> InMemoryEngineConfig {
        InMemoryEngineConfig {
            inner: Arc::new(InMemoryEngineConfigInner::new()),
        }
    }

    /// Adds a listener registered on the engine's event bus when the engine is built.
    pub fn add_engine_listener(&self, listener: EngineEventListener) {
        self.inner.add_engine_listener(listener)
    }

    pub fn event_listeners(&self) -> Vec<EngineEventListener> {
        self.inner.event_listeners()
    }
}

#[derive(Default)]
struct InMemoryEngineConfigInner {
    event_listeners: Atomic<Vec<EngineEventListener>>,
}

impl InMemoryEngineConfigInner {
    fn new() -> InMemoryEngineConfigInner {
        InMemoryEngineConfigInner {
            event_listeners: atomic(Vec::new()),
        }
    }

    fn add_engine_listener(&self, listener: EngineEventListener) {
        self.event_listeners.write_with(|it| it.push(listener))
    }

    fn event_listeners(&self) -> Vec<EngineEventListener> {
        self.event_listeners.read_with(|listeners| listeners.to_vec())
    }
}
