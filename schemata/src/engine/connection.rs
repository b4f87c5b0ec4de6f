use super::event::VersionChangeListener;
use super::transaction::{Transaction, TransactionMode};
use crate::errors::SchemataResult;
use std::fmt::Formatter;
use std::ops::Deref;
use std::sync::Arc;

/// An open connection to one store at one version.
pub trait ConnectionProvider: Send + Sync {
    /// Unique id of this connection.
    fn id(&self) -> &str;

    /// Identifier of the store this connection belongs to.
    fn identifier(&self) -> &str;

    fn version(&self) -> u32;

    /// Committed collections, sorted by name.
    fn collection_names(&self) -> SchemataResult<Vec<String>>;

    /// Starts a transaction over `collections`. Only `ReadOnly` and `ReadWrite` may be
    /// requested; a version change is granted by the engine's `open` alone.
    ///
    /// Fails with `StoreClosed` on a closed connection, `InvalidOperation` for a
    /// version-change request and `TransactionError` when a collection is unknown.
    fn transaction(&self, collections: &[&str], mode: TransactionMode) -> SchemataResult<Transaction>;

    /// Registers a callback run when another opener requests a newer version or the
    /// store's deletion.
    fn on_version_change(&self, listener: VersionChangeListener) -> SchemataResult<()>;

    /// Closes the connection. Closing twice is a no-op.
    fn close(&self) -> SchemataResult<()>;

    fn is_closed(&self) -> bool;
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<dyn ConnectionProvider>,
}

impl Connection {
    pub fn new<T: ConnectionProvider + 'static>(inner: T) -> Self {
        Connection {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for Connection {
    type Target = Arc<dyn ConnectionProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id())
            .field("identifier", &self.inner.identifier())
            .field("version", &self.inner.version())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}
