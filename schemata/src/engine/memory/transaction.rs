use super::collection::MemoryCollection;
use super::connection::InMemoryConnection;
use super::store::{EngineAlerts, MemoryStore};
use crate::common::{atomic, Atomic, Key, Locked};
use crate::engine::{ConnectionProvider, EngineEvents, TransactionMode, TransactionProvider, TransactionState};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use crate::schema::TableOptions;
use im::OrdMap;
use serde_json::Value;
use std::sync::Arc;

/// A write replayed onto the committed state when a `ReadWrite` transaction commits.
#[derive(Debug, Clone)]
enum WriteOp {
    Insert {
        collection: String,
        record: Value,
        overwrite: bool,
    },
    Delete {
        collection: String,
        key: Key,
    },
    Clear {
        collection: String,
    },
}

struct TransactionWork {
    state: TransactionState,
    collections: OrdMap<String, MemoryCollection>,
    log: Vec<WriteOp>,
}

/// Present only on the version-change transaction granted by `open`.
struct UpgradeContext {
    old_version: u32,
    new_version: u32,
    connection: InMemoryConnection,
}

/// Transaction over an in-memory store.
///
/// Reads and writes go to a private copy of the collections taken when the
/// transaction began. A version-change commit swaps that copy in as the store's new
/// committed state. A read-write commit replays its writes onto the latest committed
/// state, so concurrent read-write transactions on other collections are not lost.
#[derive(Clone)]
pub struct InMemoryTransaction {
    inner: Arc<InMemoryTransactionInner>,
}

impl InMemoryTransaction {
    pub(crate) fn scoped(
        store: Arc<MemoryStore>,
        collections: OrdMap<String, MemoryCollection>,
        scope: Vec<String>,
        mode: TransactionMode,
        alerts: EngineAlerts,
    ) -> Self {
        InMemoryTransaction {
            inner: Arc::new(InMemoryTransactionInner::new(
                store,
                collections,
                Some(scope),
                mode,
                None,
                alerts,
            )),
        }
    }

    pub(crate) fn version_change(
        store: Arc<MemoryStore>,
        collections: OrdMap<String, MemoryCollection>,
        old_version: u32,
        new_version: u32,
        connection: InMemoryConnection,
        alerts: EngineAlerts,
    ) -> Self {
        let upgrade = UpgradeContext {
            old_version,
            new_version,
            connection,
        };
        InMemoryTransaction {
            inner: Arc::new(InMemoryTransactionInner::new(
                store,
                collections,
                None,
                TransactionMode::VersionChange,
                Some(upgrade),
                alerts,
            )),
        }
    }
}

impl TransactionProvider for InMemoryTransaction {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    fn state(&self) -> TransactionState {
        self.inner.work.read_with(|work| work.state)
    }

    fn collection_names(&self) -> SchemataResult<Vec<String>> {
        self.inner.collection_names()
    }

    fn create_collection(&self, name: &str, options: &TableOptions) -> SchemataResult<()> {
        self.inner.create_collection(name, options)
    }

    fn delete_collection(&self, name: &str) -> SchemataResult<()> {
        self.inner.delete_collection(name)
    }

    fn add(&self, collection: &str, record: Value) -> SchemataResult<Key> {
        self.inner.insert(collection, record, false)
    }

    fn put(&self, collection: &str, record: Value) -> SchemataResult<Key> {
        self.inner.insert(collection, record, true)
    }

    fn get(&self, collection: &str, key: &Key) -> SchemataResult<Option<Value>> {
        self.inner.get(collection, key)
    }

    fn get_all(&self, collection: &str) -> SchemataResult<Vec<Value>> {
        self.inner.get_all(collection)
    }

    fn delete(&self, collection: &str, key: &Key) -> SchemataResult<()> {
        self.inner.delete(collection, key)
    }

    fn clear(&self, collection: &str) -> SchemataResult<()> {
        self.inner.clear(collection)
    }

    fn count(&self, collection: &str) -> SchemataResult<usize> {
        self.inner.count(collection)
    }

    fn commit(&self) -> SchemataResult<()> {
        self.inner.commit()
    }

    fn abort(&self) -> SchemataResult<()> {
        self.inner.abort()
    }
}

struct InMemoryTransactionInner {
    id: String,
    mode: TransactionMode,
    scope: Option<Vec<String>>,
    store: Arc<MemoryStore>,
    work: Atomic<TransactionWork>,
    upgrade: Option<UpgradeContext>,
    alerts: EngineAlerts,
}

impl InMemoryTransactionInner {
    fn new(
        store: Arc<MemoryStore>,
        collections: OrdMap<String, MemoryCollection>,
        scope: Option<Vec<String>>,
        mode: TransactionMode,
        upgrade: Option<UpgradeContext>,
        alerts: EngineAlerts,
    ) -> Self {
        InMemoryTransactionInner {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            scope,
            store,
            work: atomic(TransactionWork {
                state: TransactionState::Active,
                collections,
                log: Vec::new(),
            }),
            upgrade,
            alerts,
        }
    }

    /// Runs one request. A failed request aborts the whole transaction.
    fn request<R>(&self, f: impl FnOnce(&mut TransactionWork) -> SchemataResult<R>) -> SchemataResult<R> {
        let result = self.work.write_with(|work| {
            if work.state != TransactionState::Active {
                return Err(SchemataError::new(
                    &format!("Transaction {} is no longer active", self.id),
                    ErrorKind::TransactionError,
                ));
            }
            f(work)
        });

        if let Err(e) = &result {
            log::error!("Request failed in {} transaction {}: {}", self.mode, self.id, e);
            self.abort()?;
        }
        result
    }

    fn ensure_scope(&self, name: &str) -> SchemataResult<()> {
        match &self.scope {
            Some(scope) if !scope.iter().any(|it| it == name) => Err(SchemataError::new(
                &format!("Collection '{}' is outside the scope of transaction {}", name, self.id),
                ErrorKind::TransactionError,
            )),
            _ => Ok(()),
        }
    }

    fn ensure_writable(&self) -> SchemataResult<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(SchemataError::new(
                &format!("Transaction {} is read-only", self.id),
                ErrorKind::TransactionError,
            ))
        }
    }

    fn ensure_version_change(&self, operation: &str) -> SchemataResult<()> {
        if self.mode == TransactionMode::VersionChange {
            Ok(())
        } else {
            Err(SchemataError::new(
                &format!("Cannot {} outside a version change", operation),
                ErrorKind::TransactionError,
            ))
        }
    }

    fn collection<'a>(
        &self,
        work: &'a mut TransactionWork,
        name: &str,
    ) -> SchemataResult<&'a mut MemoryCollection> {
        self.ensure_scope(name)?;
        work.collections.get_mut(name).ok_or_else(|| {
            SchemataError::new(
                &format!("Collection '{}' does not exist", name),
                ErrorKind::TransactionError,
            )
        })
    }

    fn collection_names(&self) -> SchemataResult<Vec<String>> {
        self.request(|work| {
            Ok(work
                .collections
                .keys()
                .filter(|name| self.ensure_scope(name).is_ok())
                .cloned()
                .collect())
        })
    }

    fn create_collection(&self, name: &str, options: &TableOptions) -> SchemataResult<()> {
        self.request(|work| {
            self.ensure_version_change("create a collection")?;
            options.validate()?;
            if work.collections.contains_key(name) {
                return Err(SchemataError::new(
                    &format!("Collection '{}' already exists", name),
                    ErrorKind::TransactionError,
                ));
            }
            work.collections
                .insert(name.to_string(), MemoryCollection::new(options.clone()));
            log::debug!("Created collection '{}' with key path {}", name, options.key_path);
            Ok(())
        })
    }

    fn delete_collection(&self, name: &str) -> SchemataResult<()> {
        self.request(|work| {
            self.ensure_version_change("delete a collection")?;
            if work.collections.remove(name).is_none() {
                return Err(SchemataError::new(
                    &format!("Collection '{}' does not exist", name),
                    ErrorKind::TransactionError,
                ));
            }
            log::debug!("Deleted collection '{}'", name);
            Ok(())
        })
    }

    fn insert(&self, name: &str, record: Value, overwrite: bool) -> SchemataResult<Key> {
        self.request(|work| {
            self.ensure_writable()?;
            let (key, stored) = self.collection(work, name)?.insert(record, overwrite)?;
            work.log.push(WriteOp::Insert {
                collection: name.to_string(),
                record: stored,
                overwrite,
            });
            Ok(key)
        })
    }

    fn get(&self, name: &str, key: &Key) -> SchemataResult<Option<Value>> {
        self.request(|work| Ok(self.collection(work, name)?.get(key)))
    }

    fn get_all(&self, name: &str) -> SchemataResult<Vec<Value>> {
        self.request(|work| Ok(self.collection(work, name)?.values()))
    }

    fn delete(&self, name: &str, key: &Key) -> SchemataResult<()> {
        self.request(|work| {
            self.ensure_writable()?;
            self.collection(work, name)?.remove(key);
            work.log.push(WriteOp::Delete {
                collection: name.to_string(),
                key: key.clone(),
            });
            Ok(())
        })
    }

    fn clear(&self, name: &str) -> SchemataResult<()> {
        self.request(|work| {
            self.ensure_writable()?;
            self.collection(work, name)?.clear();
            work.log.push(WriteOp::Clear {
                collection: name.to_string(),
            });
            Ok(())
        })
    }

    fn count(&self, name: &str) -> SchemataResult<usize> {
        self.request(|work| Ok(self.collection(work, name)?.len()))
    }

    fn commit(&self) -> SchemataResult<()> {
        let result = self.work.write_with(|work| {
            if work.state != TransactionState::Active {
                return Err(SchemataError::new(
                    &format!("Cannot commit transaction {}: it is no longer active", self.id),
                    ErrorKind::TransactionError,
                ));
            }

            let applied = match self.mode {
                TransactionMode::ReadOnly => Ok(()),
                TransactionMode::ReadWrite => self.replay(&work.log),
                TransactionMode::VersionChange => self.swap_in(work.collections.clone()),
            };

            match applied {
                Ok(()) => work.state = TransactionState::Committed,
                Err(_) => work.state = TransactionState::Aborted,
            }
            work.log.clear();
            applied
        });

        match &result {
            Ok(()) => {
                if let Some(upgrade) = &self.upgrade {
                    log::info!(
                        "Store {} upgraded from version {} to {}",
                        self.store.identifier(),
                        upgrade.old_version,
                        upgrade.new_version
                    );
                    self.alerts.alert(
                        EngineEvents::Committed,
                        self.store.identifier(),
                        upgrade.old_version,
                        upgrade.new_version,
                    );
                }
            }
            Err(e) => {
                log::error!("Commit of transaction {} failed: {}", self.id, e);
                self.finish_aborted_upgrade();
            }
        }
        result
    }

    fn abort(&self) -> SchemataResult<()> {
        let aborted = self.work.write_with(|work| {
            if work.state != TransactionState::Active {
                return false;
            }
            work.state = TransactionState::Aborted;
            work.collections = OrdMap::new();
            work.log.clear();
            true
        });

        if aborted {
            log::debug!("Transaction {} aborted", self.id);
            self.finish_aborted_upgrade();
        }
        Ok(())
    }

    /// Applies the write log to a copy of the latest committed collections and swaps
    /// it in only when every write succeeds.
    fn replay(&self, log: &[WriteOp]) -> SchemataResult<()> {
        self.store.data.write_with(|data| {
            let mut collections = data.collections.clone();
            for op in log {
                let name = match op {
                    WriteOp::Insert { collection, .. }
                    | WriteOp::Delete { collection, .. }
                    | WriteOp::Clear { collection } => collection,
                };
                let target = collections.get_mut(name).ok_or_else(|| {
                    SchemataError::new(
                        &format!("Collection '{}' was removed before commit", name),
                        ErrorKind::TransactionError,
                    )
                })?;
                match op {
                    WriteOp::Insert {
                        record, overwrite, ..
                    } => {
                        target.insert(record.clone(), *overwrite).map_err(|e| {
                            SchemataError::new_with_cause(
                                &format!("Commit conflicts with a concurrent write to '{}'", name),
                                ErrorKind::TransactionError,
                                e,
                            )
                        })?;
                    }
                    WriteOp::Delete { key, .. } => target.remove(key),
                    WriteOp::Clear { .. } => target.clear(),
                }
            }
            data.collections = collections;
            Ok(())
        })
    }

    fn swap_in(&self, collections: OrdMap<String, MemoryCollection>) -> SchemataResult<()> {
        let Some(upgrade) = &self.upgrade else {
            return Err(SchemataError::new(
                "Version change transaction has no upgrade context",
                ErrorKind::InternalError,
            ));
        };

        self.store.data.write_with(|data| {
            data.collections = collections;
            data.version = upgrade.new_version;
            data.upgrading = false;
            data.connections.push(upgrade.connection.clone());
        });
        Ok(())
    }

    /// Releases the store after a failed version change and closes the connection the
    /// open handed out, as the open as a whole has failed.
    fn finish_aborted_upgrade(&self) {
        let Some(upgrade) = &self.upgrade else {
            return;
        };

        self.store.data.write_with(|data| data.upgrading = false);
        log::warn!(
            "Upgrade of store {} from version {} to {} rolled back",
            self.store.identifier(),
            upgrade.old_version,
            upgrade.new_version
        );
        self.alerts.alert(
            EngineEvents::Aborted,
            self.store.identifier(),
            upgrade.old_version,
            upgrade.new_version,
        );
        if let Err(e) = upgrade.connection.close() {
            log::warn!("Failed to close connection after aborted upgrade: {}", e);
        }
    }
}

impl Drop for InMemoryTransactionInner {
    fn drop(&mut self) {
        let active = self.work.read_with(|work| work.state == TransactionState::Active);
        if active {
            log::warn!("Transaction {} dropped while active, aborting", self.id);
            if let Err(e) = self.abort() {
                log::error!("Failed to abort dropped transaction {}: {}", self.id, e);
            }
        }
    }
}
