//! # Schemata - Versioned Schema Migrations
//!
//! Schemata keeps the shape of an embedded transactional key-object store in step
//! with the code that uses it. An application declares the tables of every schema
//! version it has ever shipped and the migration steps between them; opening a store
//! then runs exactly the steps the store has not seen yet, all inside one upgrade
//! transaction.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use schemata::database::Database;
//! use schemata::migration::MigrationStep;
//! use schemata::schema::{SchemaSnapshot, SerdeCodec, Table};
//!
//! #[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
//! struct Todo {
//!     id: u64,
//!     title: String,
//! }
//!
//! # fn main() -> schemata::errors::SchemataResult<()> {
//! let todos = Table::new("todo", SerdeCodec::<Todo>::new(), "id");
//! let v1 = SchemaSnapshot::builder().table(&todos).build()?;
//!
//! let db = Database::builder()
//!     .identifier("todos")
//!     .add_migration(MigrationStep::create_tables(SchemaSnapshot::empty(), v1))
//!     .open()?;
//!
//! let key = db.query().insert(&todos, &Todo { id: 1, title: "ship it".into() })?;
//! assert!(db.query().get(&todos, &key)?.is_some());
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Keys, key paths, lock helpers and the event bus
//! - [`database`] - The handle an open resolves to
//! - [`engine`] - Storage engine seam and the in-memory engine
//! - [`errors`] - Error kinds and result type
//! - [`migration`] - Migration steps, chains and the runner
//! - [`query`] - Schema-bound record access
//! - [`schema`] - Codecs, tables and schema snapshots
//! - [`schemata_builder`] - Builder for opening a database
//! - [`schemata_config`] - Configuration behind the builder

pub mod common;
pub mod database;
pub mod engine;
pub mod errors;
pub mod migration;
pub mod query;
pub mod schema;
pub mod schemata_builder;
pub mod schemata_config;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
