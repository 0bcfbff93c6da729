//! Configuration management for the push-to-talk client

pub mod file;

use std::net::IpAddr;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

use file::PttConfigFile;

/// Default gateway hostname, resolved over mDNS
pub const DEFAULT_HOST: &str = "beacon.local";

/// Default gateway WebSocket port
pub const DEFAULT_PORT: u16 = 8765;

/// Default gateway WebSocket path
pub const DEFAULT_PATH: &str = "/ws";

/// Default session mode
pub const DEFAULT_MODE: &str = "paste";

/// Default speaker volume
pub const DEFAULT_VOLUME: u8 = 128;

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Device identifier (lowercase hex) used in session ids
    pub device_id: String,

    /// WiFi candidates, first to associate wins
    pub wifi: Vec<WifiCredential>,

    /// Speech gateway endpoint
    pub server: ServerConfig,

    /// Loop timers
    pub timing: TimingConfig,

    /// Speaker volume (0-255)
    pub volume: u8,
}

/// WiFi network credentials
#[derive(Clone)]
pub struct WifiCredential {
    pub ssid: String,
    pub password: String,
}

impl std::fmt::Debug for WifiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredential")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

/// Speech gateway endpoint configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Hostname (`name.local` for mDNS) or literal IP address
    pub host: String,

    /// WebSocket port
    pub port: u16,

    /// WebSocket path
    pub path: String,

    /// Auth token sent with every session start
    pub token: String,

    /// Session mode requested from the gateway
    pub mode: String,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("mode", &self.mode)
            .finish()
    }
}

/// Loop timers, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Hard ceiling on a single recording
    pub max_record_ms: u64,

    /// Resolution attempts at startup
    pub resolve_attempts: u32,

    /// Fixed backoff between resolution attempts
    pub resolve_backoff_ms: u64,

    /// Per-query resolver timeout
    pub resolve_timeout_ms: u64,

    /// Interval between re-resolutions of a named host
    pub recheck_interval_ms: u64,

    /// Delay before re-opening a dropped WebSocket session
    pub reconnect_interval_ms: u64,

    /// Poll interval while waiting for WiFi association
    pub wifi_poll_ms: u64,

    /// Minimum interval between accepted button edges
    pub debounce_ms: u64,

    /// Keep-alive pulses stop after this much idle time
    pub keepalive_idle_timeout_ms: u64,

    /// Interval between keep-alive pulses
    pub keepalive_pulse_interval_ms: u64,

    /// Length of one keep-alive pulse
    pub keepalive_pulse_ms: u64,

    /// Power off after this much idle time
    pub auto_shutdown_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_record_ms: 8000,
            resolve_attempts: 5,
            resolve_backoff_ms: 1000,
            resolve_timeout_ms: 1500,
            recheck_interval_ms: 30_000,
            reconnect_interval_ms: 2000,
            wifi_poll_ms: 500,
            debounce_ms: 15,
            keepalive_idle_timeout_ms: 300_000,
            keepalive_pulse_interval_ms: 15_000,
            keepalive_pulse_ms: 100,
            auto_shutdown_ms: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// Priority is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unusable or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn from_sources<F>(fc: PttConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_id = match env("BEACON_PTT_DEVICE_ID").or(fc.device_id) {
            Some(id) => normalize_device_id(&id)?,
            None => {
                let host = hostname::get()
                    .map_or_else(|_| "beacon-ptt".to_string(), |h| h.to_string_lossy().to_string());
                derive_device_id(&host)
            }
        };

        let port = match env("BEACON_PTT_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("invalid BEACON_PTT_PORT {raw:?}: {e}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let host = env("BEACON_PTT_HOST")
            .or(fc.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        if host.trim().is_empty() {
            return Err(Error::Config("server host is empty".to_string()));
        }

        let mut path = fc.server.path.unwrap_or_else(|| DEFAULT_PATH.to_string());
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        let server = ServerConfig {
            host: host.trim().to_string(),
            port,
            path,
            token: env("BEACON_PTT_TOKEN").or(fc.server.token).unwrap_or_default(),
            mode: env("BEACON_PTT_MODE")
                .or(fc.server.mode)
                .unwrap_or_else(|| DEFAULT_MODE.to_string()),
        };

        let default = TimingConfig::default();
        let t = fc.timing;
        let timing = TimingConfig {
            max_record_ms: t.max_record_ms.unwrap_or(default.max_record_ms),
            resolve_attempts: t.resolve_attempts.unwrap_or(default.resolve_attempts).max(1),
            resolve_backoff_ms: t.resolve_backoff_ms.unwrap_or(default.resolve_backoff_ms),
            resolve_timeout_ms: t.resolve_timeout_ms.unwrap_or(default.resolve_timeout_ms),
            recheck_interval_ms: t.recheck_interval_ms.unwrap_or(default.recheck_interval_ms),
            reconnect_interval_ms: t
                .reconnect_interval_ms
                .unwrap_or(default.reconnect_interval_ms),
            wifi_poll_ms: default.wifi_poll_ms,
            debounce_ms: t.debounce_ms.unwrap_or(default.debounce_ms),
            keepalive_idle_timeout_ms: t
                .keepalive_idle_timeout_ms
                .unwrap_or(default.keepalive_idle_timeout_ms),
            keepalive_pulse_interval_ms: t
                .keepalive_pulse_interval_ms
                .unwrap_or(default.keepalive_pulse_interval_ms),
            keepalive_pulse_ms: t.keepalive_pulse_ms.unwrap_or(default.keepalive_pulse_ms),
            auto_shutdown_ms: t.auto_shutdown_ms.filter(|ms| *ms > 0),
        };

        if timing.keepalive_pulse_ms >= timing.keepalive_pulse_interval_ms {
            return Err(Error::Config(
                "keep-alive pulse must be shorter than its interval".to_string(),
            ));
        }

        let wifi = fc
            .wifi
            .into_iter()
            .map(|w| WifiCredential {
                ssid: w.ssid,
                password: w.password,
            })
            .collect();

        Ok(Self {
            device_id,
            wifi,
            server,
            timing,
            volume: fc.audio.volume.unwrap_or(DEFAULT_VOLUME),
        })
    }

    /// WebSocket URL for a resolved address
    #[must_use]
    pub fn ws_url(&self, address: IpAddr) -> String {
        self.server.ws_url(address)
    }
}

impl ServerConfig {
    /// WebSocket URL for a resolved address
    #[must_use]
    pub fn ws_url(&self, address: IpAddr) -> String {
        let host = match address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        format!("ws://{host}:{}{}", self.port, self.path)
    }
}

/// Derive a stable device id from the host name
///
/// First four bytes of the SHA-256 digest, lowercase hex.
#[must_use]
pub fn derive_device_id(hostname: &str) -> String {
    let digest = Sha256::digest(hostname.as_bytes());
    hex::encode(&digest[..4])
}

fn normalize_device_id(raw: &str) -> Result<String> {
    let id = raw.trim().to_ascii_lowercase();
    if id.is_empty() || id.len() > 16 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Config(format!(
            "device id must be 1-16 hex digits, got {raw:?}"
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = Config::from_sources(PttConfigFile::default(), no_env).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.path, DEFAULT_PATH);
        assert_eq!(config.server.mode, DEFAULT_MODE);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.volume, DEFAULT_VOLUME);
        assert_eq!(config.device_id.len(), 8);
    }

    #[test]
    fn env_overrides_file() {
        let fc: PttConfigFile = toml::from_str(
            r#"
            device_id = "cafe"
            [server]
            host = "file.local"
            port = 9000
            token = "from-file"
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("BEACON_PTT_HOST", "10.0.0.7"),
            ("BEACON_PTT_TOKEN", "from-env"),
            ("BEACON_PTT_DEVICE_ID", "BEEF"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::from_sources(fc, |k| env.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(config.server.host, "10.0.0.7");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.token, "from-env");
        assert_eq!(config.device_id, "beef");
    }

    #[test]
    fn rejects_bad_port_env() {
        let result = Config::from_sources(PttConfigFile::default(), |k| {
            (k == "BEACON_PTT_PORT").then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_non_hex_device_id() {
        let fc = PttConfigFile {
            device_id: Some("not-hex".to_string()),
            ..PttConfigFile::default()
        };
        assert!(Config::from_sources(fc, no_env).is_err());
    }

    #[test]
    fn zero_auto_shutdown_disables_it() {
        let fc: PttConfigFile = toml::from_str("[timing]\nauto_shutdown_ms = 0").unwrap();
        let config = Config::from_sources(fc, no_env).unwrap();
        assert_eq!(config.timing.auto_shutdown_ms, None);
    }

    #[test]
    fn path_gets_leading_slash() {
        let fc: PttConfigFile = toml::from_str("[server]\npath = \"stream\"").unwrap();
        let config = Config::from_sources(fc, no_env).unwrap();
        assert_eq!(config.server.path, "/stream");
    }

    #[test]
    fn derived_device_id_is_stable_hex() {
        let a = derive_device_id("desk-mic");
        assert_eq!(a, derive_device_id("desk-mic"));
        assert_ne!(a, derive_device_id("other-mic"));
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ws_url_formats_both_families() {
        let config = Config::from_sources(PttConfigFile::default(), no_env).unwrap();
        assert_eq!(
            config.ws_url("192.168.1.20".parse().unwrap()),
            "ws://192.168.1.20:8765/ws"
        );
        assert_eq!(config.ws_url("::1".parse().unwrap()), "ws://[::1]:8765/ws");
    }

    #[test]
    fn debug_hides_secrets() {
        let fc: PttConfigFile = toml::from_str(
            "[server]\ntoken = \"hunter2\"\n[[wifi]]\nssid = \"home\"\npassword = \"pw123\"",
        )
        .unwrap();
        let config = Config::from_sources(fc, no_env).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("pw123"));
        assert!(rendered.contains("home"));
    }
}
