//! Instance controller.
//!
//! Wires one coffee-break instance together: the session state machine, the
//! counter store, peer presence and the broadcast bus. Everything that mutates
//! instance state runs on the single task driving [`Controller::run`]; the
//! outside world sends [`Command`]s in and watches [`Snapshot`]s come out.

pub mod controller_handler;

pub use controller_handler::{Command, Controller, Snapshot};
