//! The storage engine seam.
//!
//! The migration runner and the query layer only talk to an engine through the
//! provider traits here. [`InMemoryEngine`] is the bundled implementation.

mod connection;
mod event;
pub mod memory;
mod storage_engine;
mod transaction;

pub use connection::*;
pub use event::*;
pub use memory::{InMemoryEngine, InMemoryEngineConfig};
pub use storage_engine::*;
pub use transaction::*;
