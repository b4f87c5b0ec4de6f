//! Reference engine keeping every store in process memory.

mod collection;
mod config;
mod connection;
mod engine;
mod store;
mod transaction;

pub use config::*;
pub use connection::InMemoryConnection;
pub use engine::*;
pub use transaction::InMemoryTransaction;
