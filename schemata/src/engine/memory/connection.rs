use super::store::{EngineAlerts, MemoryStore};
use super::transaction::InMemoryTransaction;
use crate::common::{atomic, Atomic, Locked};
use crate::engine::{
    ConnectionProvider, EngineEvents, Transaction, TransactionMode, VersionChangeEvent,
    VersionChangeListener,
};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct InMemoryConnection {
    inner: Arc<InMemoryConnectionInner>,
}

impl InMemoryConnection {
    pub(crate) fn new(store: Arc<MemoryStore>, version: u32, alerts: EngineAlerts) -> Self {
        InMemoryConnection {
            inner: Arc::new(InMemoryConnectionInner {
                id: uuid::Uuid::new_v4().to_string(),
                version,
                store,
                closed: AtomicBool::new(false),
                listeners: atomic(Vec::new()),
                alerts,
            }),
        }
    }

    /// Runs every version-change listener of this connection. A failing listener is
    /// logged and the remaining ones still run.
    pub(crate) fn notify_version_change(&self, event: &VersionChangeEvent) {
        let listeners = self.inner.listeners.read_with(|it| it.clone());
        for listener in listeners {
            if let Err(e) = listener.notify(event.clone()) {
                log::error!("Version change listener of connection {} failed: {}", self.inner.id, e);
            }
        }
    }
}

impl ConnectionProvider for InMemoryConnection {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn identifier(&self) -> &str {
        self.inner.store.identifier()
    }

    fn version(&self) -> u32 {
        self.inner.version
    }

    fn collection_names(&self) -> SchemataResult<Vec<String>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .store
            .data
            .read_with(|data| data.collections.keys().cloned().collect()))
    }

    fn transaction(&self, collections: &[&str], mode: TransactionMode) -> SchemataResult<Transaction> {
        self.inner.transaction(collections, mode)
    }

    fn on_version_change(&self, listener: VersionChangeListener) -> SchemataResult<()> {
        self.inner.ensure_open()?;
        self.inner.listeners.write_with(|it| it.push(listener));
        Ok(())
    }

    fn close(&self) -> SchemataResult<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

struct InMemoryConnectionInner {
    id: String,
    version: u32,
    store: Arc<MemoryStore>,
    closed: AtomicBool,
    listeners: Atomic<Vec<VersionChangeListener>>,
    alerts: EngineAlerts,
}

impl InMemoryConnectionInner {
    fn ensure_open(&self) -> SchemataResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Connection {} to {} is closed", self.id, self.store.identifier());
            return Err(SchemataError::new(
                &format!("Connection to {} is closed", self.store.identifier()),
                ErrorKind::StoreClosed,
            ));
        }
        Ok(())
    }

    fn transaction(&self, names: &[&str], mode: TransactionMode) -> SchemataResult<Transaction> {
        self.ensure_open()?;
        if mode == TransactionMode::VersionChange {
            log::error!("Version change transactions are granted by open only");
            return Err(SchemataError::new(
                "Version change transactions are granted by open only",
                ErrorKind::InvalidOperation,
            ));
        }
        if names.is_empty() {
            return Err(SchemataError::new(
                "A transaction needs at least one collection in scope",
                ErrorKind::InvalidOperation,
            ));
        }

        let collections = self.store.data.read_with(|data| {
            if data.upgrading {
                return Err(SchemataError::new(
                    &format!("A version change of {} is in progress", self.store.identifier()),
                    ErrorKind::TransactionError,
                ));
            }
            if let Some(missing) = names.iter().find(|name| !data.collections.contains_key(**name)) {
                return Err(SchemataError::new(
                    &format!("Collection '{}' does not exist", missing),
                    ErrorKind::TransactionError,
                ));
            }
            Ok(data.collections.clone())
        })?;

        let scope = names.iter().map(|name| name.to_string()).collect();
        Ok(Transaction::new(InMemoryTransaction::scoped(
            self.store.clone(),
            collections,
            scope,
            mode,
            self.alerts.clone(),
        )))
    }

    fn close(&self) -> SchemataResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.store
            .data
            .write_with(|data| data.connections.retain(|it| it.inner.id != self.id));
        self.listeners.write_with(|it| it.clear());
        log::debug!("Connection {} to {} closed", self.id, self.store.identifier());
        self.alerts.alert(
            EngineEvents::Closed,
            self.store.identifier(),
            self.version,
            self.version,
        );
        Ok(())
    }
}
