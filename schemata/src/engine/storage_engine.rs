use super::connection::Connection;
use super::event::EngineEventListener;
use super::transaction::Transaction;
use crate::common::SubscriberRef;
use crate::errors::SchemataResult;
use std::fmt::Formatter;
use std::ops::Deref;
use std::sync::Arc;

/// What an `open` request resolved to.
pub enum OpenOutcome {
    /// The store already holds the requested version.
    Opened(Connection),
    /// The stored version is below the requested one. The transaction is the single
    /// version-change transaction for the whole open; the connection only becomes
    /// usable once it commits.
    UpgradeNeeded {
        connection: Connection,
        transaction: Transaction,
        old_version: u32,
    },
}

impl std::fmt::Debug for OpenOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenOutcome::Opened(connection) => f.debug_tuple("Opened").field(connection).finish(),
            OpenOutcome::UpgradeNeeded {
                connection,
                old_version,
                ..
            } => f
                .debug_struct("UpgradeNeeded")
                .field("connection", connection)
                .field("old_version", old_version)
                .finish(),
        }
    }
}

/// Identifier and committed version of a store known to an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub identifier: String,
    pub version: u32,
}

/// The embedded transactional store a migration runs against.
///
/// # Implementations
/// - `InMemoryEngine`: process-local stores backed by persistent maps
pub trait StorageEngineProvider: Send + Sync {
    /// Opens `identifier` at `target_version`, creating the store at version 0 when it
    /// does not exist.
    ///
    /// # Errors
    /// * `PreconditionViolation` when the stored version is above `target_version`
    /// * `Blocked` when an upgrade is needed but other connections stay open
    /// * `OpenError` when the engine cannot open the store at all
    fn open(&self, identifier: &str, target_version: u32) -> SchemataResult<OpenOutcome>;

    /// Removes a store and all its collections. Deleting an unknown store succeeds.
    /// Fails with `Blocked` while connections stay open.
    fn delete_store(&self, identifier: &str) -> SchemataResult<()>;

    /// Every known store, sorted by identifier.
    fn databases(&self) -> SchemataResult<Vec<StoreInfo>>;

    fn subscribe(&self, listener: EngineEventListener) -> SchemataResult<Option<SubscriberRef>>;

    fn unsubscribe(&self, subscriber: SubscriberRef) -> SchemataResult<()>;
}

#[derive(Clone)]
pub struct StorageEngine {
    inner: Arc<dyn StorageEngineProvider>,
}

impl StorageEngine {
    pub fn new<T: StorageEngineProvider + 'static>(inner: T) -> Self {
        StorageEngine {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for StorageEngine {
    type Target = Arc<dyn StorageEngineProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        StorageEngine::new(super::memory::InMemoryEngine::new())
    }
}
