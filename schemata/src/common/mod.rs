//! Shared building blocks: keys and key paths, lock helpers, the event bus and
//! crate-wide constants.

mod constants;
mod event_bus;
mod key;
mod util;

pub use constants::*;
pub use event_bus::*;
pub use key::*;
pub use util::*;
