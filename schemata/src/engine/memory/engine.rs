use super::config::InMemoryEngineConfig;
use super::connection::InMemoryConnection;
use super::store::{EngineAlerts, MemoryStore};
use super::transaction::InMemoryTransaction;
use crate::common::{atomic, Atomic, Locked, SchemataEventBus, SubscriberRef};
use crate::engine::{
    Connection, ConnectionProvider, EngineEventListener, EngineEvents, OpenOutcome,
    StorageEngineProvider, StoreInfo, Transaction, VersionChangeEvent,
};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Process-local storage engine.
///
/// Every store lives in memory for as long as the engine does. Clones share the same
/// stores, so two handles opened through clones of one engine see each other's
/// connections and can block each other's upgrades.
///
/// ```rust,ignore
/// let engine = InMemoryEngine::new();
/// let db = Database::builder()
///     .identifier("todos")
///     .engine(StorageEngine::new(engine.clone()))
///     .add_migration(step)
///     .open()?;
/// ```
#[derive(Clone)]
pub struct InMemoryEngine {
    inner: Arc<InMemoryEngineInner>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        InMemoryEngine {
            inner: Arc::new(InMemoryEngineInner::new(InMemoryEngineConfig::new())),
        }
    }

    /// Builds an engine and registers the configured event listeners.
    pub fn with_config(config: InMemoryEngineConfig) -> SchemataResult<Self> {
        let inner = InMemoryEngineInner::new(config);
        for listener in inner.config.event_listeners() {
            inner.alerts.event_bus().register(listener)?;
        }
        Ok(InMemoryEngine {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &InMemoryEngineConfig {
        &self.inner.config
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngineProvider for InMemoryEngine {
    fn open(&self, identifier: &str, target_version: u32) -> SchemataResult<OpenOutcome> {
        self.inner.open(identifier, target_version)
    }

    fn delete_store(&self, identifier: &str) -> SchemataResult<()> {
        self.inner.delete_store(identifier)
    }

    fn databases(&self) -> SchemataResult<Vec<StoreInfo>> {
        Ok(self.inner.databases())
    }

    fn subscribe(&self, listener: EngineEventListener) -> SchemataResult<Option<SubscriberRef>> {
        self.inner.alerts.event_bus().register(listener)
    }

    fn unsubscribe(&self, subscriber: SubscriberRef) -> SchemataResult<()> {
        self.inner.alerts.event_bus().deregister(subscriber)
    }
}

/// Outcome of one admission attempt, decided under the store lock.
enum Admission {
    Ready(InMemoryConnection),
    Upgrade(InMemoryConnection, InMemoryTransaction, u32),
    /// Other connections must close first; carries them and the stored version.
    Contended(Vec<InMemoryConnection>, u32),
}

struct InMemoryEngineInner {
    stores: Atomic<BTreeMap<String, Arc<MemoryStore>>>,
    alerts: EngineAlerts,
    config: InMemoryEngineConfig,
}

impl InMemoryEngineInner {
    fn new(config: InMemoryEngineConfig) -> Self {
        InMemoryEngineInner {
            stores: atomic(BTreeMap::new()),
            alerts: EngineAlerts::new(SchemataEventBus::new()),
            config,
        }
    }

    fn store(&self, identifier: &str) -> Arc<MemoryStore> {
        self.stores.write_with(|stores| {
            stores
                .entry(identifier.to_string())
                .or_insert_with(|| Arc::new(MemoryStore::new(identifier)))
                .clone()
        })
    }

    fn open(&self, identifier: &str, target_version: u32) -> SchemataResult<OpenOutcome> {
        if identifier.trim().is_empty() {
            log::error!("Cannot open a store with an empty identifier");
            return Err(SchemataError::new(
                "Store identifier must not be empty",
                ErrorKind::OpenError,
            ));
        }

        let store = self.store(identifier);
        let mut admission = self.admit(&store, target_version)?;
        if let Admission::Contended(others, old_version) = admission {
            let event = VersionChangeEvent {
                identifier: identifier.to_string(),
                old_version,
                new_version: Some(target_version),
            };
            for connection in &others {
                connection.notify_version_change(&event);
            }
            admission = self.admit(&store, target_version)?;
        }

        match admission {
            Admission::Ready(connection) => {
                log::debug!("Opened {} at version {}", identifier, target_version);
                self.alerts
                    .alert(EngineEvents::Opened, identifier, target_version, target_version);
                Ok(OpenOutcome::Opened(Connection::new(connection)))
            }
            Admission::Upgrade(connection, transaction, old_version) => {
                log::debug!(
                    "Granted version change of {} from {} to {}",
                    identifier,
                    old_version,
                    target_version
                );
                self.alerts
                    .alert(EngineEvents::UpgradeStarted, identifier, old_version, target_version);
                Ok(OpenOutcome::UpgradeNeeded {
                    connection: Connection::new(connection),
                    transaction: Transaction::new(transaction),
                    old_version,
                })
            }
            Admission::Contended(others, old_version) => {
                log::warn!(
                    "Upgrade of {} to version {} blocked by {} open connection(s)",
                    identifier,
                    target_version,
                    others.len()
                );
                self.alerts
                    .alert(EngineEvents::Blocked, identifier, old_version, target_version);
                Err(SchemataError::new(
                    &format!(
                        "Upgrade of {} to version {} is blocked by {} open connection(s)",
                        identifier,
                        target_version,
                        others.len()
                    ),
                    ErrorKind::Blocked,
                ))
            }
        }
    }

    fn admit(&self, store: &Arc<MemoryStore>, target_version: u32) -> SchemataResult<Admission> {
        let identifier = store.identifier();
        store.data.write_with(|data| {
            if data.deleted {
                log::error!("Store {} was deleted while being opened", identifier);
                return Err(SchemataError::new(
                    &format!("Store {} was deleted while being opened", identifier),
                    ErrorKind::OpenError,
                ));
            }
            if data.upgrading {
                log::error!("A version change of {} is already in progress", identifier);
                return Err(SchemataError::new(
                    &format!("A version change of {} is already in progress", identifier),
                    ErrorKind::Blocked,
                ));
            }
            if data.version > target_version {
                log::error!(
                    "Store {} is at version {}, above the requested version {}",
                    identifier,
                    data.version,
                    target_version
                );
                return Err(SchemataError::new(
                    &format!(
                        "Store {} is at version {}, above the requested version {}",
                        identifier, data.version, target_version
                    ),
                    ErrorKind::PreconditionViolation,
                ));
            }

            if data.version == target_version {
                let connection = InMemoryConnection::new(store.clone(), target_version, self.alerts.clone());
                data.connections.push(connection.clone());
                return Ok(Admission::Ready(connection));
            }

            if !data.connections.is_empty() {
                return Ok(Admission::Contended(data.connections.clone(), data.version));
            }

            data.upgrading = true;
            let connection = InMemoryConnection::new(store.clone(), target_version, self.alerts.clone());
            let transaction = InMemoryTransaction::version_change(
                store.clone(),
                data.collections.clone(),
                data.version,
                target_version,
                connection.clone(),
                self.alerts.clone(),
            );
            Ok(Admission::Upgrade(connection, transaction, data.version))
        })
    }

    fn delete_store(&self, identifier: &str) -> SchemataResult<()> {
        let Some(store) = self.stores.read_with(|stores| stores.get(identifier).cloned()) else {
            return Ok(());
        };

        let mut contended = self.try_delete(&store)?;
        if let Some((others, old_version)) = contended {
            let event = VersionChangeEvent {
                identifier: identifier.to_string(),
                old_version,
                new_version: None,
            };
            for connection in &others {
                connection.notify_version_change(&event);
            }
            contended = self.try_delete(&store)?;
        }

        match contended {
            None => Ok(()),
            Some((others, old_version)) => {
                log::warn!(
                    "Deletion of {} blocked by {} open connection(s)",
                    identifier,
                    others.len()
                );
                self.alerts.alert(EngineEvents::Blocked, identifier, old_version, 0);
                Err(SchemataError::new(
                    &format!(
                        "Deletion of {} is blocked by {} open connection(s)",
                        identifier,
                        others.len()
                    ),
                    ErrorKind::Blocked,
                ))
            }
        }
    }

    /// Deletes the store when nothing holds it, or returns the connections in the way.
    fn try_delete(&self, store: &Arc<MemoryStore>) -> SchemataResult<Option<(Vec<InMemoryConnection>, u32)>> {
        let identifier = store.identifier();
        let deleted_version = self.stores.write_with(|stores| {
            store.data.write_with(|data| {
                if data.deleted {
                    return Ok(None);
                }
                if data.upgrading {
                    return Err(SchemataError::new(
                        &format!("A version change of {} is in progress", identifier),
                        ErrorKind::Blocked,
                    ));
                }
                if !data.connections.is_empty() {
                    return Ok(Some(Err((data.connections.clone(), data.version))));
                }
                data.deleted = true;
                stores.remove(identifier);
                Ok(Some(Ok(data.version)))
            })
        })?;

        match deleted_version {
            None => Ok(None),
            Some(Err(contended)) => Ok(Some(contended)),
            Some(Ok(version)) => {
                log::info!("Deleted store {} at version {}", identifier, version);
                self.alerts.alert(EngineEvents::Deleted, identifier, version, 0);
                Ok(None)
            }
        }
    }

    fn databases(&self) -> Vec<StoreInfo> {
        let stores: Vec<Arc<MemoryStore>> = self.stores.read_with(|stores| stores.values().cloned().collect());
        stores
            .into_iter()
            .map(|store| StoreInfo {
                identifier: store.identifier().to_string(),
                version: store.data.read_with(|data| data.version),
            })
            .collect()
    }
}
