//! Schema declarations: record codecs, tables and the snapshots that group them
//! per version.

mod codec;
mod snapshot;
mod table;

pub use codec::*;
pub use snapshot::*;
pub use table::*;
