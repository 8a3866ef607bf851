//! Runtime configuration
//!
//! Read once at startup from the command line and environment.

use std::path::PathBuf;

use crate::blob::DEFAULT_MAX_UPLOAD_BYTES;
use crate::coordinator::TrackerRetention;
use crate::error::ConfigError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// Default upload directory
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default URL prefix for stored uploads
pub const DEFAULT_UPLOAD_URL: &str = "/uploads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the WebSocket listener binds to
    pub addr: String,
    pub upload_dir: PathBuf,
    pub upload_url_prefix: String,
    pub max_upload_bytes: usize,
    pub retention: TrackerRetention,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            upload_url_prefix: DEFAULT_UPLOAD_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention: TrackerRetention::Retain,
        }
    }
}

impl Config {
    /// Build from process arguments and environment
    ///
    /// The first CLI argument, if any, overrides the bind address.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(std::env::args().nth(1), |var| std::env::var(var).ok())
    }

    /// Build from an explicit address override and variable lookup
    pub fn from_lookup(
        addr_arg: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = addr_arg.or_else(|| lookup("ROOM_RELAY_ADDR")) {
            config.addr = addr;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
                var: "PORT",
                value: port.clone(),
            })?;
            config.addr = format!("127.0.0.1:{}", port);
        }

        if let Some(dir) = lookup("ROOM_RELAY_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = lookup("ROOM_RELAY_UPLOAD_URL") {
            config.upload_url_prefix = prefix;
        }
        if let Some(max) = lookup("ROOM_RELAY_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = max.parse().map_err(|_| ConfigError::InvalidValue {
                var: "ROOM_RELAY_MAX_UPLOAD_BYTES",
                value: max.clone(),
            })?;
        }
        if let Some(evict) = lookup("ROOM_RELAY_EVICT_TRACKERS") {
            config.retention = match evict.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => TrackerRetention::EvictWithHistory,
                "0" | "false" | "no" => TrackerRetention::Retain,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "ROOM_RELAY_EVICT_TRACKERS",
                        value: evict,
                    })
                }
            };
        }

        Ok(config)
    }
}
