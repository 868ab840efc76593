//! JSON configuration.
//!
//! The config file carries a `settings` object of shared defaults and a
//! `devices` array; each device entry overrides the shared settings
//! field-by-field. `name`, `address` and a resolvable `mode` and
//! `carbon` are mandatory, everything else has a built-in default.
//!
//! ```json
//! {
//!   "settings": { "carbon": "127.0.0.1:2003", "mode": "READ", "sleep": true },
//!   "devices": [
//!     { "name": "garden", "address": "00:12:6F:0A:8B:11:1" },
//!     { "name": "pond", "address": "00:12:6F:0A:8B:12:1", "mode": "FEED" }
//!   ]
//! }
//! ```

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// TCP port for the control channel when the config does not set one.
pub const DEFAULT_CONTROL_PORT: u16 = 1846;
/// Seconds between device read cycles.
pub const DEFAULT_PERIOD: u64 = 30;
/// Per-read timeout on the device link, in seconds.
pub const DEFAULT_TIMEOUT: u64 = 60;
/// Seconds a sleeping device needs to wake before its next cycle.
pub const DEFAULT_WARM_UP: u64 = 5;
/// Seconds to wait after a failed cycle (0 falls back to the period).
pub const DEFAULT_ERROR_WAIT: u64 = 0;
/// Seconds between scheduled device resets (one week).
pub const DEFAULT_RESET_TIME: u64 = 604_800;

/// Errors raised while loading or resolving the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Json(#[from] serde_json::Error),

    /// A field with no default is set neither in `settings` nor on the
    /// device entry.
    #[error("device {device:?} is missing required field {field:?}")]
    MissingField {
        device: String,
        field: &'static str,
    },

    #[error("duplicate device name {0:?}")]
    DuplicateName(String),
}

/// Polling mode for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Request one batch of samples per cycle with `READ`.
    Read,
    /// Ask the device to push samples continuously with `FEED <secs>`.
    Feed,
    /// Send `RESET` and reconnect; only ever entered at runtime.
    Reset,
}

impl Mode {
    /// Wire spelling of the mode command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Read => "READ",
            Mode::Feed => "FEED",
            Mode::Reset => "RESET",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared defaults from the `settings` object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub control_port: Option<u16>,
    pub carbon: Option<String>,
    pub mode: Option<Mode>,
    pub period: Option<u64>,
    pub timeout: Option<u64>,
    pub sleep: Option<bool>,
    pub warm_up: Option<u64>,
    pub error_wait: Option<u64>,
    pub reset_time: Option<u64>,
}

/// One entry from the `devices` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub carbon: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub period: Option<u64>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub sleep: Option<bool>,
    #[serde(default)]
    pub warm_up: Option<u64>,
    #[serde(default)]
    pub error_wait: Option<u64>,
    #[serde(default)]
    pub reset_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    devices: Vec<DeviceEntry>,
}

/// Fully resolved per-device configuration. All durations are seconds.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    pub address: String,
    pub carbon: String,
    pub mode: Mode,
    pub period: u64,
    pub timeout: u64,
    pub sleep: bool,
    pub warm_up: u64,
    pub error_wait: u64,
    pub reset_time: u64,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub control_port: u16,
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load and resolve the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Config::parse(&text)
    }

    /// Parse and resolve config from JSON text.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        let mut devices = Vec::with_capacity(raw.devices.len());
        for entry in &raw.devices {
            if devices.iter().any(|d: &DeviceConfig| d.name == entry.name) {
                return Err(ConfigError::DuplicateName(entry.name.clone()));
            }
            devices.push(resolve(&raw.settings, entry)?);
        }
        Ok(Config {
            control_port: raw.settings.control_port.unwrap_or(DEFAULT_CONTROL_PORT),
            devices,
        })
    }
}

fn resolve(settings: &Settings, entry: &DeviceEntry) -> Result<DeviceConfig, ConfigError> {
    let missing = |field: &'static str| ConfigError::MissingField {
        device: entry.name.clone(),
        field,
    };
    Ok(DeviceConfig {
        name: entry.name.clone(),
        address: entry.address.clone(),
        carbon: entry
            .carbon
            .clone()
            .or_else(|| settings.carbon.clone())
            .ok_or_else(|| missing("carbon"))?,
        mode: entry.mode.or(settings.mode).ok_or_else(|| missing("mode"))?,
        period: entry.period.or(settings.period).unwrap_or(DEFAULT_PERIOD),
        timeout: entry
            .timeout
            .or(settings.timeout)
            .unwrap_or(DEFAULT_TIMEOUT),
        sleep: entry.sleep.or(settings.sleep).unwrap_or(false),
        warm_up: entry
            .warm_up
            .or(settings.warm_up)
            .unwrap_or(DEFAULT_WARM_UP),
        error_wait: entry
            .error_wait
            .or(settings.error_wait)
            .unwrap_or(DEFAULT_ERROR_WAIT),
        reset_time: entry
            .reset_time
            .or(settings.reset_time)
            .unwrap_or(DEFAULT_RESET_TIME),
    })
}
