pub mod assistant;
pub mod beverage;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod network;
pub mod presence;
pub mod session_management;
pub mod storage;

pub use beverage::BeverageKind;
pub use controller::{Command, Controller, Snapshot};
