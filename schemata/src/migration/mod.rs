//! Versioned schema evolution.
//!
//! A [`MigrationChain`] lists the [`MigrationStep`]s from the empty schema up to the
//! latest version. The [`MigrationRunner`] compares the chain with the version a store
//! was left at and runs the steps in between inside one upgrade transaction, so a
//! store is always either fully at its old version or fully at the latest one.
//!
//! ```rust,ignore
//! let v1 = SchemaSnapshot::builder().table(&todos).build()?;
//! let chain = MigrationChain::new(vec![MigrationStep::create_tables(SchemaSnapshot::empty(), v1)])?;
//!
//! let db = MigrationRunner::new(StorageEngine::default()).open_and_migrate("todos", &chain)?;
//! ```

mod chain;
mod runner;
mod step;

pub use chain::*;
pub use runner::*;
pub use step::*;
