// src/config.rs

//! Runtime settings, read once from the environment. `main` loads `.env`
//! before the first read.
//!
//! | variable | default |
//! |---|---|
//! | `LAUNCHCONTROL_LISTEN` | `127.0.0.1:6969` |
//! | `BUTTPLUG_ADDRESS` | `ws://127.0.0.1:12345/buttplug` |
//! | `LAUNCHCONTROL_NOACT` | `false` |
//! | `LAUNCHCONTROL_CONNECT_TIMEOUT` | `10` (seconds) |
//! | `BUTTPLUG_SCAN_SECONDS` | `3` |

use log::warn;
use once_cell::sync::OnceCell;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::manager::DEFAULT_CONNECTION_TIMEOUT;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address the HTTP server binds to
    pub listen: String,
    /// Intiface websocket server
    pub buttplug_address: String,
    /// Log device commands instead of connecting to a device
    pub noact: bool,
    pub connect_timeout: Duration,
    pub scan_duration: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:6969".to_string(),
            buttplug_address: "ws://127.0.0.1:12345/buttplug".to_string(),
            noact: false,
            connect_timeout: DEFAULT_CONNECTION_TIMEOUT,
            scan_duration: Duration::from_secs(3),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();
        Self {
            listen: lookup("LAUNCHCONTROL_LISTEN").unwrap_or(defaults.listen),
            buttplug_address: lookup("BUTTPLUG_ADDRESS").unwrap_or(defaults.buttplug_address),
            noact: lookup("LAUNCHCONTROL_NOACT")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.noact),
            connect_timeout: parse_or(&lookup, "LAUNCHCONTROL_CONNECT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            scan_duration: parse_or(&lookup, "BUTTPLUG_SCAN_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.scan_duration),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid value {:?} for {}", value, key);
            None
        }
    }
}

/// Reads the settings. Later calls return the same values.
pub fn init() -> &'static Settings {
    SETTINGS.get_or_init(Settings::from_env)
}
