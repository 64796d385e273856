//! Error types shared across the crate.
//!
//! Every runtime failure in this crate degrades to a safe default (zeroed
//! counters, a self-only presence view, a fallback barista line), so these
//! types mostly travel as far as a `warn!` log. Only configuration errors are
//! reported to the user at startup.

pub mod types;

pub use types::*;
