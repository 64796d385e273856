use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sip budget and break duration bounds.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_sips: u32,
    pub default_duration_secs: u32,
    pub min_duration_secs: u32,
    pub max_duration_secs: u32,
    pub duration_step_secs: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sips: 30,
            default_duration_secs: 300,
            min_duration_secs: 60,
            max_duration_secs: 300,
            duration_step_secs: 30,
        }
    }
}

impl SessionSettings {
    /// Clamps `secs` into `[min, max]` and snaps it to the nearest step above `min`.
    pub fn normalize_duration(&self, secs: u32) -> u32 {
        let clamped = secs.clamp(self.min_duration_secs, self.max_duration_secs);
        let step = self.duration_step_secs.max(1);
        let offset = clamped - self.min_duration_secs;
        let snapped = self.min_duration_secs + ((offset + step / 2) / step) * step;
        snapped.min(self.max_duration_secs)
    }
}

/// Heartbeat cadence and liveness window for peer presence.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    pub heartbeat_period_ms: u64,
    pub liveness_window_ms: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            heartbeat_period_ms: 1000,
            liveness_window_ms: 5000,
        }
    }
}

impl PresenceSettings {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }

    pub fn liveness_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.liveness_window_ms as i64)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Without a key the barista stays offline.
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: String::from("gemini-2.5-flash"),
            endpoint: String::from("https://generativelanguage.googleapis.com/v1beta"),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Loopback UDP fan-out between processes sharing a storage path.
    #[default]
    Udp,
    /// In-process channel, only reaches controllers in the same process.
    Local,
}
