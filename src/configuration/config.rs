use super::types::*;
use crate::error_handling::types::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration structure that defines all runtime parameters.
///
/// Every field has a default, so an empty TOML file (or no file at all) yields
/// a working single-machine setup. Command-line flags parsed in `main` are
/// applied on top of the loaded value.
///
/// # Examples
///
/// ```no_run
/// use coffeebreak::configuration::config::Config;
/// use std::path::Path;
///
/// let config = Config::from_file(Path::new("coffeebreak.toml")).unwrap();
/// println!("Sip budget: {}", config.session.max_sips);
/// ```
///
/// # Fields Overview
///
/// - `storage_path`: directory holding the counter record and channel registrations
/// - `channel_name`: instances only see peers that use the same channel name
/// - `transport`: `udp` for cross-process instances, `local` for in-process ones
/// - `session`: sip budget and break duration bounds
/// - `presence`: heartbeat period and liveness window
/// - `assistant`: barista collaborator settings
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,
    pub channel_name: String,
    pub transport: TransportKind,
    pub session: SessionSettings,
    pub presence: PresenceSettings,
    pub assistant: AssistantSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(".coffeebreak"),
            channel_name: String::from("coffee_break_channel"),
            transport: TransportKind::default(),
            session: SessionSettings::default(),
            presence: PresenceSettings::default(),
            assistant: AssistantSettings::default(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        debug!("Read {} byte(s) of configuration from {}", raw.len(), path.display());
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the relations between the session and presence constants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.max_sips == 0 {
            return Err(ConfigError::NotInRange(String::from("session.max_sips must be > 0")));
        }
        if s.min_duration_secs == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "session.min_duration_secs must be > 0",
            )));
        }
        if s.duration_step_secs == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "session.duration_step_secs must be > 0",
            )));
        }
        if !(s.min_duration_secs <= s.default_duration_secs
            && s.default_duration_secs <= s.max_duration_secs)
        {
            return Err(ConfigError::NotInRange(format!(
                "session durations must satisfy min <= default <= max, got {} / {} / {}",
                s.min_duration_secs, s.default_duration_secs, s.max_duration_secs
            )));
        }

        let p = &self.presence;
        if p.heartbeat_period_ms == 0 {
            return Err(ConfigError::NotInRange(String::from(
                "presence.heartbeat_period_ms must be > 0",
            )));
        }
        if p.liveness_window_ms <= p.heartbeat_period_ms {
            return Err(ConfigError::NotInRange(format!(
                "presence.liveness_window_ms ({}) must exceed heartbeat_period_ms ({})",
                p.liveness_window_ms, p.heartbeat_period_ms
            )));
        }

        if self.channel_name.trim().is_empty() {
            return Err(ConfigError::NotInRange(String::from("channel_name must not be empty")));
        }
        Ok(())
    }

    /// Directory used by the UDP transport for this channel's registrations.
    pub fn channel_dir(&self) -> PathBuf {
        self.storage_path.join("channels").join(&self.channel_name)
    }
}
