use crate::engine::{Connection, ConnectionProvider, VersionChangeListener};
use crate::errors::SchemataResult;
use crate::query::QueryService;
use crate::schema::SchemaSnapshot;
use crate::schemata_builder::SchemataBuilder;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

/// An open store at the latest version of its migration chain.
///
/// A `Database` is what a successful open resolves to. It carries the identifier and
/// version it was opened at and hands out a [`QueryService`] scoped to the latest
/// schema snapshot. Clones share the same connection; the connection is closed by
/// [`Database::close`] or when the last clone is dropped.
///
/// # Examples
///
/// ```rust,ignore
/// let db = Database::builder()
///     .identifier("todos")
///     .add_migration(MigrationStep::create_tables(SchemaSnapshot::empty(), v1))
///     .open()?;
///
/// let key = db.query().insert(&todos, &Todo::new("write docs"))?;
/// db.close()?;
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Creates a [`SchemataBuilder`] to configure and open a database.
    pub fn builder() -> SchemataBuilder {
        SchemataBuilder::new()
    }

    pub(crate) fn new(identifier: &str, version: u32, connection: Connection, snapshot: SchemaSnapshot) -> Self {
        let query = QueryService::for_connection(snapshot.clone(), connection.clone());
        Database {
            inner: Arc::new(DatabaseInner {
                identifier: identifier.to_string(),
                version,
                connection,
                snapshot,
                query,
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn version(&self) -> u32 {
        self.inner.version
    }

    /// The schema of [`Database::version`].
    pub fn snapshot(&self) -> &SchemaSnapshot {
        &self.inner.snapshot
    }

    /// Record access scoped to the latest snapshot. Every call runs in its own engine
    /// transaction.
    pub fn query(&self) -> &QueryService {
        &self.inner.query
    }

    /// Names of the collections that physically exist in the store.
    pub fn table_names(&self) -> SchemataResult<Vec<String>> {
        self.inner.connection.collection_names()
    }

    /// Registers a callback run when another opener requests a newer version or
    /// deletes the store. The upgrade stays blocked unless the callback (or someone
    /// else) closes this database.
    pub fn on_version_change(&self, listener: VersionChangeListener) -> SchemataResult<()> {
        self.inner.connection.on_version_change(listener)
    }

    /// Closes the underlying connection. Later queries fail with `StoreClosed`.
    pub fn close(&self) -> SchemataResult<()> {
        log::debug!("Closing database {} at version {}", self.inner.identifier, self.inner.version);
        self.inner.connection.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.connection.is_closed()
    }

    /// Closes this database as soon as another opener requests a version change.
    pub(crate) fn close_on_version_change(&self) -> SchemataResult<()> {
        let database: Weak<DatabaseInner> = Arc::downgrade(&self.inner);
        self.on_version_change(VersionChangeListener::new(move |event| match database.upgrade() {
            Some(inner) => {
                log::info!(
                    "Closing {} at version {} for a version change to {:?}",
                    inner.identifier,
                    inner.version,
                    event.new_version
                );
                inner.connection.close()
            }
            None => Ok(()),
        }))
    }
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("identifier", &self.inner.identifier)
            .field("version", &self.inner.version)
            .field("tables", &self.inner.snapshot.table_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct DatabaseInner {
    identifier: String,
    version: u32,
    connection: Connection,
    snapshot: SchemaSnapshot,
    query: QueryService,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        if !self.connection.is_closed() {
            if let Err(e) = self.connection.close() {
                log::warn!("Failed to close {} on drop: {}", self.identifier, e);
            }
        }
    }
}
