//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-ptt/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct PttConfigFile {
    /// Device identifier override (hex)
    #[serde(default)]
    pub device_id: Option<String>,

    /// WiFi candidate networks, tried in order
    #[serde(default)]
    pub wifi: Vec<WifiFileConfig>,

    /// Speech gateway endpoint
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Loop timers
    #[serde(default)]
    pub timing: TimingFileConfig,

    /// Speaker/microphone settings
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// One WiFi candidate network
#[derive(Debug, Clone, Deserialize)]
pub struct WifiFileConfig {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

/// Speech gateway endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Hostname (`name.local` for mDNS) or literal IP address
    pub host: Option<String>,

    /// WebSocket port
    pub port: Option<u16>,

    /// WebSocket path
    pub path: Option<String>,

    /// Auth token sent with every session start
    pub token: Option<String>,

    /// Session mode requested from the gateway (e.g. "paste")
    pub mode: Option<String>,
}

/// Loop timer overrides, all in milliseconds
#[derive(Debug, Default, Deserialize)]
pub struct TimingFileConfig {
    pub max_record_ms: Option<u64>,
    pub resolve_attempts: Option<u32>,
    pub resolve_backoff_ms: Option<u64>,
    pub resolve_timeout_ms: Option<u64>,
    pub recheck_interval_ms: Option<u64>,
    pub reconnect_interval_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub keepalive_idle_timeout_ms: Option<u64>,
    pub keepalive_pulse_interval_ms: Option<u64>,
    pub keepalive_pulse_ms: Option<u64>,
    /// Power off after this much idle time; absent or 0 disables
    pub auto_shutdown_ms: Option<u64>,
}

/// Audio settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Speaker volume (0-255)
    pub volume: Option<u8>,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. The standard path is optional:
/// when missing or unreadable, defaults are used and a warning is logged.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<PttConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(PttConfigFile::default());
    };

    if !path.exists() {
        return Ok(PttConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(PttConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(PttConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-ptt/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-ptt")
            .join("config.toml")
    })
}
