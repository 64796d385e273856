use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::assistant::types::{ChatTurn, Speaker};

pub const BARISTA: &str = "Barista";

/// One line of the barista chat. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub is_user: bool,
    pub sender: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_user<S: Into<String>>(text: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_user: true,
            sender: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_barista<S: Into<String>>(text: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_user: false,
            sender: Some(BARISTA.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Converts a transcript into assistant conversation turns.
pub fn history(transcript: &[ChatMessage]) -> Vec<ChatTurn> {
    transcript
        .iter()
        .map(|m| ChatTurn {
            speaker: if m.is_user { Speaker::User } else { Speaker::Assistant },
            text: m.text.clone(),
        })
        .collect()
}

/// Renders seconds as `m:ss`.
pub fn format_duration(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
