use crate::common::Key;
use crate::engine::{Connection, ConnectionProvider, Transaction, TransactionMode, TransactionProvider};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use crate::schema::{AnyTable, Codec, SchemaSnapshot, Table};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

#[derive(Clone)]
enum Backend {
    /// The version-change transaction of a running upgrade.
    Upgrade(Transaction),
    /// An open connection; every call runs in a transaction of its own.
    Connection(Connection),
}

/// Schema-checked access to the tables of one snapshot.
///
/// A query service never touches a table its snapshot does not declare: every
/// operation first checks that the table is declared under its name with an equal
/// declaration and fails with `SchemaError` before any engine call otherwise.
///
/// Inside a migration step the service is bound to the upgrade transaction, so all
/// its writes commit or roll back with the whole upgrade. On an open database each
/// call runs in its own engine transaction.
///
/// ```rust,ignore
/// let key = db.query().insert(&todos, &Todo { id: 1, title: "ship".into() })?;
/// let todo = db.query().get(&todos, &key)?;
/// ```
#[derive(Clone)]
pub struct QueryService {
    inner: Arc<QueryServiceInner>,
}

impl QueryService {
    pub(crate) fn for_transaction(snapshot: SchemaSnapshot, transaction: Transaction) -> Self {
        QueryService {
            inner: Arc::new(QueryServiceInner {
                snapshot,
                backend: Backend::Upgrade(transaction),
            }),
        }
    }

    pub(crate) fn for_connection(snapshot: SchemaSnapshot, connection: Connection) -> Self {
        QueryService {
            inner: Arc::new(QueryServiceInner {
                snapshot,
                backend: Backend::Connection(connection),
            }),
        }
    }

    pub fn snapshot(&self) -> &SchemaSnapshot {
        &self.inner.snapshot
    }

    /// Names of the tables this service may address, in declaration order.
    pub fn table_names(&self) -> Vec<String> {
        self.inner.snapshot.table_names()
    }

    /// Creates the physical collection for the table declared as `name`.
    ///
    /// Only possible inside a migration step; the engine refuses structural changes
    /// anywhere else with `TransactionError`, as it does for an existing collection.
    pub fn create_table(&self, name: &str) -> SchemataResult<()> {
        let table = self.inner.declared(name)?;
        log::debug!("Creating table '{}'", name);
        self.inner
            .run(name, TransactionMode::ReadWrite, |tx| tx.create_collection(name, table.options()))
    }

    /// Deletes the physical collection for the table declared as `name`.
    pub fn delete_table(&self, name: &str) -> SchemataResult<()> {
        self.inner.declared(name)?;
        log::debug!("Deleting table '{}'", name);
        self.inner
            .run(name, TransactionMode::ReadWrite, |tx| tx.delete_collection(name))
    }

    /// Validates `value` through the table's codec and stores it, failing on an
    /// existing key. Returns the record's key.
    pub fn insert<C: Codec>(&self, table: &Table<C>, value: &C::Value) -> SchemataResult<Key> {
        self.inner.ensure_declared(table)?;
        let raw = encode(table, value)?;
        let name = table.name();
        self.inner.run(name, TransactionMode::ReadWrite, |tx| tx.add(name, raw))
    }

    /// Inserts `values` in order. The first failure stops the remaining inserts and is
    /// returned; on an open database earlier inserts stay committed.
    pub fn insert_all<C: Codec>(&self, table: &Table<C>, values: &[C::Value]) -> SchemataResult<Vec<Key>> {
        values.iter().map(|value| self.insert(table, value)).collect()
    }

    /// Inserts or replaces a record.
    pub fn put<C: Codec>(&self, table: &Table<C>, value: &C::Value) -> SchemataResult<Key> {
        self.inner.ensure_declared(table)?;
        let raw = encode(table, value)?;
        let name = table.name();
        self.inner.run(name, TransactionMode::ReadWrite, |tx| tx.put(name, raw))
    }

    pub fn get<C: Codec>(&self, table: &Table<C>, key: &Key) -> SchemataResult<Option<C::Value>> {
        self.inner.ensure_declared(table)?;
        let name = table.name();
        let raw = self.inner.run(name, TransactionMode::ReadOnly, |tx| tx.get(name, key))?;
        raw.map(|raw| decode(table, &raw)).transpose()
    }

    /// Every record of the table in key order. Fails with `ValidationError` when any
    /// stored record no longer decodes.
    pub fn get_all<C: Codec>(&self, table: &Table<C>) -> SchemataResult<Vec<C::Value>> {
        self.inner.ensure_declared(table)?;
        let name = table.name();
        let raws = self.inner.run(name, TransactionMode::ReadOnly, |tx| tx.get_all(name))?;
        raws.iter().map(|raw| decode(table, raw)).collect()
    }

    pub fn delete<C: Codec>(&self, table: &Table<C>, key: &Key) -> SchemataResult<()> {
        self.inner.ensure_declared(table)?;
        let name = table.name();
        self.inner.run(name, TransactionMode::ReadWrite, |tx| tx.delete(name, key))
    }

    pub fn clear<C: Codec>(&self, table: &Table<C>) -> SchemataResult<()> {
        self.inner.ensure_declared(table)?;
        let name = table.name();
        self.inner.run(name, TransactionMode::ReadWrite, |tx| tx.clear(name))
    }

    pub fn count<C: Codec>(&self, table: &Table<C>) -> SchemataResult<usize> {
        self.inner.ensure_declared(table)?;
        let name = table.name();
        self.inner.run(name, TransactionMode::ReadOnly, |tx| tx.count(name))
    }

    /// Inserts a raw record into the table declared as `name`, after running it
    /// through that table's codec.
    pub fn insert_raw(&self, name: &str, record: &Value) -> SchemataResult<Key> {
        let table = self.inner.declared(name)?;
        let canonical = table.validate(record)?;
        self.inner.run(name, TransactionMode::ReadWrite, |tx| tx.add(name, canonical))
    }

    pub fn get_raw(&self, name: &str, key: &Key) -> SchemataResult<Option<Value>> {
        let table = self.inner.declared(name)?;
        let raw = self.inner.run(name, TransactionMode::ReadOnly, |tx| tx.get(name, key))?;
        raw.map(|raw| validate_stored(&table, &raw)).transpose()
    }

    pub fn get_all_raw(&self, name: &str) -> SchemataResult<Vec<Value>> {
        let table = self.inner.declared(name)?;
        let raws = self.inner.run(name, TransactionMode::ReadOnly, |tx| tx.get_all(name))?;
        raws.iter().map(|raw| validate_stored(&table, raw)).collect()
    }
}

impl Debug for QueryService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.inner.backend {
            Backend::Upgrade(_) => "upgrade",
            Backend::Connection(_) => "connection",
        };
        f.debug_struct("QueryService")
            .field("tables", &self.inner.snapshot.table_names())
            .field("backend", &backend)
            .finish()
    }
}

struct QueryServiceInner {
    snapshot: SchemaSnapshot,
    backend: Backend,
}

impl QueryServiceInner {
    fn declared(&self, name: &str) -> SchemataResult<AnyTable> {
        match self.snapshot.table(name) {
            Some(table) => Ok(table.clone()),
            None => {
                log::error!("Table '{}' is not declared in this schema version", name);
                Err(SchemataError::new(
                    &format!(
                        "Table '{}' is not declared in this schema version; declared tables are {:?}",
                        name,
                        self.snapshot.table_names()
                    ),
                    ErrorKind::SchemaError,
                ))
            }
        }
    }

    fn ensure_declared<C: Codec>(&self, table: &Table<C>) -> SchemataResult<()> {
        if self.snapshot.contains(table) {
            return Ok(());
        }

        self.declared(table.name())?;
        log::error!("Table '{}' does not match its declaration in this schema version", table.name());
        Err(SchemataError::new(
            &format!(
                "Table '{}' is declared differently in this schema version",
                table.name()
            ),
            ErrorKind::SchemaError,
        ))
    }

    fn run<R>(
        &self,
        name: &str,
        mode: TransactionMode,
        request: impl FnOnce(&Transaction) -> SchemataResult<R>,
    ) -> SchemataResult<R> {
        match &self.backend {
            Backend::Upgrade(transaction) => request(transaction),
            Backend::Connection(connection) => {
                let transaction = connection.transaction(&[name], mode)?;
                match request(&transaction) {
                    Ok(result) => {
                        transaction.commit()?;
                        Ok(result)
                    }
                    Err(e) => {
                        transaction.abort()?;
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Encodes then decodes `value`, so only values the codec can read back are stored.
fn encode<C: Codec>(table: &Table<C>, value: &C::Value) -> SchemataResult<Value> {
    let raw = table.codec().encode(value)?;
    table.codec().decode(&raw)?;
    Ok(raw)
}

fn decode<C: Codec>(table: &Table<C>, raw: &Value) -> SchemataResult<C::Value> {
    table.codec().decode(raw).map_err(|e| stored_mismatch(table.name(), e))
}

fn validate_stored(table: &AnyTable, raw: &Value) -> SchemataResult<Value> {
    table.validate(raw).map_err(|e| stored_mismatch(table.name(), e))
}

fn stored_mismatch(name: &str, cause: SchemataError) -> SchemataError {
    log::error!("Stored record in '{}' no longer matches its declaration: {}", name, cause);
    SchemataError::new_with_cause(
        &format!("Stored record in '{}' no longer matches its declaration", name),
        ErrorKind::ValidationError,
        cause,
    )
}
