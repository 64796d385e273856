//! Session management core module.
//!
//! This module provides the break session state machine and everything it
//! drives: the countdown timer, the barista chat transcript, and the
//! completion path into the counter store and the broadcast bus.

use serde::{Deserialize, Serialize};

use crate::error_handling::types::AssistantError;

/// Submodule for chat messages and display helpers.
pub mod chat;
/// Submodule for the per-session countdown timer.
pub mod countdown_timer;
/// Submodule for session data structures.
pub mod session;
/// Submodule for the session state machine.
pub mod session_controller;

/// Represents the current state of the session.
///
/// Variants:
/// - `Idle`: no beverage selected, the menu is showing.
/// - `Active`: a break is running and sips are accepted.
/// - `Ended`: the break is over, waiting for a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Active,
    Ended,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    /// The sip budget was used up.
    Consumed,
    /// The countdown reached zero.
    TimeExpired,
    /// The user left early.
    Exited,
}

impl FinishReason {
    /// Only a consumed cup counts towards the lifetime stats.
    pub fn is_completed(&self) -> bool {
        matches!(self, FinishReason::Consumed)
    }
}

/// Asynchronous notifications routed back into the session controller.
///
/// Each carries the epoch of the session that caused it so anything arriving
/// after that session was replaced can be dropped.
#[derive(Debug)]
pub enum SessionEvent {
    Tick { epoch: u64, remaining_secs: u32 },
    Expired { epoch: u64 },
    OpeningLine { epoch: u64, result: Result<String, AssistantError> },
    Reply { epoch: u64, result: Result<String, AssistantError> },
}

impl SessionEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            SessionEvent::Tick { epoch, .. }
            | SessionEvent::Expired { epoch }
            | SessionEvent::OpeningLine { epoch, .. }
            | SessionEvent::Reply { epoch, .. } => *epoch,
        }
    }
}
