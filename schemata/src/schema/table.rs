use super::codec::Codec;
use crate::common::KeyPath;
use crate::errors::{ErrorKind, SchemataError, SchemataResult};
use serde_json::Value;
use std::any::{type_name, TypeId};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Physical options the engine needs to create a table's collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableOptions {
    pub key_path: KeyPath,
    pub auto_increment: bool,
}

impl TableOptions {
    pub fn new(key_path: KeyPath) -> Self {
        TableOptions {
            key_path,
            auto_increment: false,
        }
    }

    pub fn validate(&self) -> SchemataResult<()> {
        self.key_path.validate()?;
        if self.auto_increment && self.key_path.is_compound() {
            log::error!("Auto increment is not allowed with compound key path {}", self.key_path);
            return Err(SchemataError::new(
                &format!("Auto increment requires a single key path, found {}", self.key_path),
                ErrorKind::SchemaError,
            ));
        }
        Ok(())
    }
}

/// Structural identity of a table declaration.
///
/// Two declarations are the same table when name, options and codec type all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableDescriptor {
    pub name: String,
    pub options: TableOptions,
    pub codec_type: TypeId,
}

/// A typed table declaration: name, record codec and key extraction rule.
///
/// Tables are immutable and cheap to clone. The codec's `Value` type is the record
/// type every typed query against this table reads and writes.
///
/// ```rust,ignore
/// let todos = Table::new("todo", SerdeCodec::<Todo>::new(), "id");
/// let people = Table::new("people", SerdeCodec::<Person>::new(), ["name", "age"]);
/// let events = Table::auto_increment("events", SerdeCodec::<Event>::new(), "seq");
/// ```
pub struct Table<C: Codec> {
    inner: Arc<TableInner<C>>,
}

impl<C: Codec> Table<C> {
    pub fn new(name: &str, codec: C, key_path: impl Into<KeyPath>) -> Self {
        Table {
            inner: Arc::new(TableInner {
                descriptor: TableDescriptor {
                    name: name.to_string(),
                    options: TableOptions::new(key_path.into()),
                    codec_type: TypeId::of::<C>(),
                },
                codec,
            }),
        }
    }

    /// Declares a table whose keys are generated by the engine when a record does
    /// not carry one at `key_path`.
    pub fn auto_increment(name: &str, codec: C, key_path: impl Into<KeyPath>) -> Self {
        Table {
            inner: Arc::new(TableInner {
                descriptor: TableDescriptor {
                    name: name.to_string(),
                    options: TableOptions {
                        key_path: key_path.into(),
                        auto_increment: true,
                    },
                    codec_type: TypeId::of::<C>(),
                },
                codec,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    pub fn options(&self) -> &TableOptions {
        &self.inner.descriptor.options
    }

    pub fn key_path(&self) -> &KeyPath {
        &self.inner.descriptor.options.key_path
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        &self.inner.descriptor
    }

    /// Type-erased view of this declaration, as stored in a snapshot.
    pub fn erase(&self) -> AnyTable {
        AnyTable {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Codec> Clone for Table<C> {
    fn clone(&self) -> Self {
        Table {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Codec> PartialEq for Table<C> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.descriptor == other.inner.descriptor
    }
}

impl<C: Codec> Debug for Table<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name())
            .field("key_path", self.key_path())
            .field("auto_increment", &self.options().auto_increment)
            .field("codec", &type_name::<C>())
            .finish()
    }
}

struct TableInner<C> {
    descriptor: TableDescriptor,
    codec: C,
}

trait ErasedTable: Send + Sync {
    fn descriptor(&self) -> &TableDescriptor;

    fn codec_name(&self) -> &'static str;

    fn validate(&self, raw: &Value) -> SchemataResult<Value>;
}

impl<C: Codec> ErasedTable for TableInner<C> {
    fn descriptor(&self) -> &TableDescriptor {
        &self.descriptor
    }

    fn codec_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn validate(&self, raw: &Value) -> SchemataResult<Value> {
        self.codec.validate(raw)
    }
}

/// A table declaration with its record type erased.
///
/// Snapshots hold `AnyTable`s so that tables with different record types can live
/// side by side; raw-record queries validate through the erased codec.
#[derive(Clone)]
pub struct AnyTable {
    inner: Arc<dyn ErasedTable>,
}

impl AnyTable {
    pub fn name(&self) -> &str {
        &self.inner.descriptor().name
    }

    pub fn options(&self) -> &TableOptions {
        &self.inner.descriptor().options
    }

    pub fn descriptor(&self) -> &TableDescriptor {
        self.inner.descriptor()
    }

    /// Decodes then re-encodes `raw` through the table's codec.
    pub fn validate(&self, raw: &Value) -> SchemataResult<Value> {
        self.inner.validate(raw)
    }
}

impl PartialEq for AnyTable {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor() == other.descriptor()
    }
}

impl Eq for AnyTable {}

impl Debug for AnyTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyTable")
            .field("name", &self.name())
            .field("key_path", &self.options().key_path)
            .field("auto_increment", &self.options().auto_increment)
            .field("codec", &self.inner.codec_name())
            .finish()
    }
}

impl<C: Codec> From<&Table<C>> for AnyTable {
    fn from(table: &Table<C>) -> Self {
        table.erase()
    }
}

impl<C: Codec> From<Table<C>> for AnyTable {
    fn from(table: Table<C>) -> Self {
        table.erase()
    }
}
