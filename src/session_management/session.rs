use crate::beverage::BeverageKind;
use crate::session_management::{FinishReason, SessionState};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The single live session of an instance.
///
/// `beverage_kind` is set exactly when `state` is not `Idle`. `epoch` grows on
/// every start and restart and never goes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub state: SessionState,
    pub beverage_kind: Option<BeverageKind>,
    pub duration_secs: u32,
    pub remaining_secs: u32,
    pub sips_taken: u32,
    pub finish_reason: Option<FinishReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub epoch: u64,
}

impl Session {
    pub fn idle(duration_secs: u32, epoch: u64) -> Self {
        Self {
            state: SessionState::Idle,
            beverage_kind: None,
            duration_secs,
            remaining_secs: duration_secs,
            sips_taken: 0,
            finish_reason: None,
            started_at: None,
            ended_at: None,
            epoch,
        }
    }

    /// True once the session ended by using up the sip budget.
    pub fn completed(&self) -> bool {
        self.finish_reason.is_some_and(|r| r.is_completed())
    }
}

/// What the finished screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub beverage_kind: BeverageKind,
    pub reason: FinishReason,
    pub sips_taken: u32,
    pub max_sips: u32,
    /// Share of the cup consumed, rounded to a whole percent.
    pub percent_consumed: u32,
}

impl SessionSummary {
    pub fn new(beverage_kind: BeverageKind, reason: FinishReason, sips_taken: u32, max_sips: u32) -> Self {
        let percent_consumed = if max_sips == 0 {
            0
        } else {
            ((sips_taken as f64 / max_sips as f64) * 100.0).round() as u32
        };
        Self {
            beverage_kind,
            reason,
            sips_taken,
            max_sips,
            percent_consumed,
        }
    }

    pub fn headline(&self) -> &'static str {
        if self.reason.is_completed() {
            "All done!"
        } else {
            "Break's Over"
        }
    }

    pub fn message(&self) -> &'static str {
        if self.reason.is_completed() {
            "Your break is up. Recharged and ready!"
        } else {
            "Time is up. Let's finish the coffee next time."
        }
    }
}
