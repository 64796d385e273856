//! # Network Module
//!
//! Same-origin broadcast bus shared by all running instances. Carries two
//! message kinds: heartbeat announcements (consumed by presence tracking)
//! and completion notifications (consumed by the counter store).
//!
//! ```text
//! ┌─────────────────┐  publish   ┌──────────────────┐  recv   ┌─────────────────┐
//! │ Controller A    │───────────▶│ LocalChannel /   │────────▶│ Controller B    │
//! │ (BusPublisher)  │            │ UdpChannel       │         │ (BusSubscription│
//! └─────────────────┘            └──────────────────┘         └─────────────────┘
//! ```

pub mod broadcast_bus;
pub mod types;
pub mod udp_channel;

pub use broadcast_bus::{BusPublisher, BusSubscription, LocalChannel};
pub use types::{BusMessage, Envelope, PeerId};
pub use udp_channel::UdpChannel;
