//! Multi-instance presence.
//!
//! Liveness comes from heartbeat recency alone. Each instance announces itself
//! every heartbeat period, and a peer unheard for longer than the liveness
//! window drops out of the online count on the next tick.

pub mod clock;
pub mod peer_tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use peer_tracker::PeerPresenceTracker;
