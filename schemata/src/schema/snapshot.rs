use super::codec::Codec;
use super::table::{AnyTable, Table};
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The set of tables a store holds at one schema version.
///
/// Snapshots are immutable and compare structurally: two snapshots are equal when
/// they declare the same table names with equal declarations, regardless of the
/// order tables were added in.
///
/// ```rust,ignore
/// let v1 = SchemaSnapshot::builder().table(&todos).build()?;
/// let v2 = SchemaSnapshot::builder().table(&todos).table(&tags).build()?;
/// ```
#[derive(Clone)]
pub struct SchemaSnapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    tables: IndexMap<String, AnyTable>,
}

impl SchemaSnapshot {
    /// The snapshot with no tables; implicit starting point of every chain.
    pub fn empty() -> Self {
        SchemaSnapshot {
            inner: Arc::new(SnapshotInner {
                tables: IndexMap::new(),
            }),
        }
    }

    pub fn builder() -> SchemaSnapshotBuilder {
        SchemaSnapshotBuilder::new()
    }

    /// Builds a snapshot from already erased tables.
    pub fn new(tables: Vec<AnyTable>) -> SchemataResult<Self> {
        let mut map = IndexMap::with_capacity(tables.len());
        for table in tables {
            table.options().validate()?;
            let name = table.name().to_string();
            if map.contains_key(&name) {
                log::error!("Table '{}' is declared twice in the same snapshot", name);
                return Err(SchemataError::new(
                    &format!("Duplicate table '{}' in snapshot", name),
                    ErrorKind::SchemaError,
                ));
            }
            map.insert(name, table);
        }
        Ok(SchemaSnapshot {
            inner: Arc::new(SnapshotInner { tables: map }),
        })
    }

    pub fn table(&self, name: &str) -> Option<&AnyTable> {
        self.inner.tables.get(name)
    }

    /// Whether `table` is declared here under its name with an equal declaration.
    pub fn contains<C: Codec>(&self, table: &Table<C>) -> bool {
        self.inner
            .tables
            .get(table.name())
            .is_some_and(|declared| declared.descriptor() == table.descriptor())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.inner.tables.contains_key(name)
    }

    /// Table names in declaration order.
    pub fn table_names(&self) -> Vec<String> {
        self.inner.tables.keys().cloned().collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &AnyTable> {
        self.inner.tables.values()
    }

    pub fn len(&self) -> usize {
        self.inner.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tables.is_empty()
    }
}

impl Default for SchemaSnapshot {
    fn default() -> Self {
        SchemaSnapshot::empty()
    }
}

impl PartialEq for SchemaSnapshot {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.len() == other.len()
            && self
                .inner
                .tables
                .iter()
                .all(|(name, table)| other.table(name) == Some(table))
    }
}

impl Eq for SchemaSnapshot {}

impl Debug for SchemaSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.tables.values()).finish()
    }
}

/// Collects table declarations and validates them together at `build`.
pub struct SchemaSnapshotBuilder {
    tables: Vec<AnyTable>,
}

impl SchemaSnapshotBuilder {
    fn new() -> Self {
        SchemaSnapshotBuilder { tables: Vec::new() }
    }

    pub fn table<C: Codec>(mut self, table: &Table<C>) -> Self {
        self.tables.push(table.erase());
        self
    }

    pub fn any_table(mut self, table: AnyTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Fails with `SchemaError` on duplicate names or malformed key paths.
    pub fn build(self) -> SchemataResult<SchemaSnapshot> {
        SchemaSnapshot::new(self.tables)
    }
}
