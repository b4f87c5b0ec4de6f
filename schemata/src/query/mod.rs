//! Schema-bound record access.

mod service;

pub use service::*;
