use crate::common::Key;
use crate::errors::SchemataResult;
use crate::schema::TableOptions;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Access mode of an engine transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
    /// Granted only by an open that raises the stored version. The only mode in which
    /// collections may be created or deleted.
    VersionChange,
}

impl TransactionMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, TransactionMode::ReadOnly)
    }
}

impl Display for TransactionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMode::ReadOnly => write!(f, "readonly"),
            TransactionMode::ReadWrite => write!(f, "readwrite"),
            TransactionMode::VersionChange => write!(f, "versionchange"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// A unit of work against one store.
///
/// Every operation resolves exactly once. A failed request aborts the whole
/// transaction: the request's own error is returned, and every later request as
/// well as `commit` fails with `TransactionError`. Writes are visible to later reads
/// of the same transaction and to nobody else until `commit`.
///
/// Error kinds returned by requests:
/// - `TransactionError` when the transaction is no longer active, the collection is
///   unknown or out of scope, a structural change is attempted outside a version
///   change, or a write is attempted in a read-only transaction.
/// - `WriteError` when a record yields no valid key or its key already exists.
pub trait TransactionProvider: Send + Sync {
    fn id(&self) -> &str;

    fn mode(&self) -> TransactionMode;

    fn state(&self) -> TransactionState;

    /// Collections visible to this transaction, sorted by name.
    fn collection_names(&self) -> SchemataResult<Vec<String>>;

    fn create_collection(&self, name: &str, options: &TableOptions) -> SchemataResult<()>;

    fn delete_collection(&self, name: &str) -> SchemataResult<()>;

    /// Inserts a record, failing on an existing key. Returns the record's key,
    /// generated when the collection auto-increments and the record has none.
    fn add(&self, collection: &str, record: Value) -> SchemataResult<Key>;

    /// Inserts or replaces a record.
    fn put(&self, collection: &str, record: Value) -> SchemataResult<Key>;

    fn get(&self, collection: &str, key: &Key) -> SchemataResult<Option<Value>>;

    /// All records in ascending key order.
    fn get_all(&self, collection: &str) -> SchemataResult<Vec<Value>>;

    fn delete(&self, collection: &str, key: &Key) -> SchemataResult<()>;

    fn clear(&self, collection: &str) -> SchemataResult<()>;

    fn count(&self, collection: &str) -> SchemataResult<usize>;

    /// Makes every write durable at once. Fails with `TransactionError` when the
    /// transaction is not active.
    fn commit(&self) -> SchemataResult<()>;

    /// Discards every write. Aborting a transaction that already finished is a no-op.
    fn abort(&self) -> SchemataResult<()>;

    fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }
}

#[derive(Clone)]
pub struct Transaction {
    inner: Arc<dyn TransactionProvider>,
}

impl Transaction {
    pub fn new<T: TransactionProvider + 'static>(inner: T) -> Self {
        Transaction {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for Transaction {
    type Target = Arc<dyn TransactionProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id())
            .field("mode", &self.inner.mode())
            .field("state", &self.inner.state())
            .finish()
    }
}
