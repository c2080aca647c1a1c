//! Glove Configuration
//!
//! All device identifiers live here rather than as module constants, so a
//! controller can be built against any glove (or a test double) without
//! process-wide state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            ansi_colors: default_true(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "roboglove".to_string()
}

/// Settings for one glove session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GloveSettings {
    /// Advertised name searched for during discovery.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Identity used when discovery comes back empty.
    #[serde(default = "default_fallback_address")]
    pub fallback_address: String,
    /// UART-style service holding the command characteristics. Short 16-bit
    /// form; the resolver also matches the expanded 128-bit base form.
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    /// Characteristic commands are written to (RX from the glove's view).
    #[serde(default = "default_write_char_uuid")]
    pub write_char_uuid: String,
    /// Characteristic responses are read from. May equal the write
    /// characteristic; the module serves both roles on this glove.
    #[serde(default = "default_read_char_uuid")]
    pub read_char_uuid: String,
    /// Discovery scan window in seconds.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Send a movement command every N samples during replay.
    #[serde(default = "default_replay_stride")]
    pub replay_stride: usize,
    /// Request a write acknowledgment from the transport (slower, reliable).
    #[serde(default = "default_false")]
    pub write_with_response: bool,
    /// Settle delay before reading back a response in interactive mode.
    #[serde(default = "default_settle_ms")]
    pub response_settle_ms: u64,

    #[serde(default)]
    pub log: LogSettings,
}

impl Default for GloveSettings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            fallback_address: default_fallback_address(),
            service_uuid: default_service_uuid(),
            write_char_uuid: default_write_char_uuid(),
            read_char_uuid: default_read_char_uuid(),
            scan_timeout_secs: default_scan_timeout_secs(),
            replay_stride: default_replay_stride(),
            write_with_response: default_false(),
            response_settle_ms: default_settle_ms(),
            log: LogSettings::default(),
        }
    }
}

fn default_device_name() -> String {
    "Hiwonder".to_string()
}
fn default_fallback_address() -> String {
    "24A528A5-46FC-C425-02D5-E59445D692C3".to_string()
}
fn default_service_uuid() -> String {
    "FFF0".to_string()
}
fn default_write_char_uuid() -> String {
    "0000FFE1-0000-1000-8000-00805F9B34FB".to_string()
}
fn default_read_char_uuid() -> String {
    "0000FFE1-0000-1000-8000-00805F9B34FB".to_string()
}
fn default_scan_timeout_secs() -> u64 {
    5
}
fn default_replay_stride() -> usize {
    1
}
fn default_settle_ms() -> u64 {
    50
}

impl GloveSettings {
    /// Load settings from an explicit file, or from the default location.
    ///
    /// An explicit path that cannot be read or parsed is an error; a missing
    /// file at the default location falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            let contents = fs::read_to_string(path)?;
            let settings = serde_json::from_str(&contents)?;
            debug!("settings loaded from {}", path.display());
            return Ok(settings);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(&path)?;
                let settings = serde_json::from_str(&contents)?;
                debug!("settings loaded from {}", path.display());
                Ok(settings)
            }
            _ => Ok(Self::default()),
        }
    }

    fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("roboglove");
        path.push("settings.json");
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_glove_module() {
        let settings = GloveSettings::default();
        assert_eq!(settings.device_name, "Hiwonder");
        assert_eq!(settings.service_uuid, "FFF0");
        assert_eq!(settings.write_char_uuid, settings.read_char_uuid);
        assert_eq!(settings.scan_timeout_secs, 5);
        assert_eq!(settings.replay_stride, 1);
        assert!(!settings.write_with_response);
    }

    #[test]
    fn partial_settings_files_fill_in_defaults() {
        let settings: GloveSettings =
            serde_json::from_str(r#"{"device_name": "Hiwonder-2", "scan_timeout_secs": 10}"#)
                .unwrap();
        assert_eq!(settings.device_name, "Hiwonder-2");
        assert_eq!(settings.scan_timeout_secs, 10);
        assert_eq!(settings.service_uuid, "FFF0");
    }
}
