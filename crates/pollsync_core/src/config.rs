//! Throttling configuration.
//!
//! # Invariants
//! - `window_size_seconds` is non-zero and divides the flood horizon, so a
//!   horizon always spans a whole number of windows.
//! - `flush_lease_seconds` is non-zero.

use crate::clock::FLOOD_HORIZON_SECONDS;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_WINDOW_SIZE_SECONDS: u32 = 2;
pub const DEFAULT_FLOOD_THRESHOLD: u32 = 60;
pub const DEFAULT_FLUSH_LEASE_SECONDS: u32 = 30;

/// Tunables of the update scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Bucket granularity.
    pub window_size_seconds: u32,
    /// Max sends per trailing horizon before deferring.
    pub flood_threshold: u32,
    /// How long an in-flight send may stay unrecorded before another sweep
    /// takes the window over.
    pub flush_lease_seconds: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_size_seconds: DEFAULT_WINDOW_SIZE_SECONDS,
            flood_threshold: DEFAULT_FLOOD_THRESHOLD,
            flush_lease_seconds: DEFAULT_FLUSH_LEASE_SECONDS,
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    ZeroWindowSize,
    WindowSizeNotDivisor(u32),
    ZeroFlushLease,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid throttle config: {err}"),
            Self::ZeroWindowSize => write!(f, "window_size_seconds must be greater than zero"),
            Self::WindowSizeNotDivisor(size) => write!(
                f,
                "window_size_seconds {size} must divide {FLOOD_HORIZON_SECONDS}"
            ),
            Self::ZeroFlushLease => write!(f, "flush_lease_seconds must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl ThrottleConfig {
    /// Parses and validates a JSON document. Missing keys take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size_seconds == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if FLOOD_HORIZON_SECONDS % self.window_size_seconds != 0 {
            return Err(ConfigError::WindowSizeNotDivisor(self.window_size_seconds));
        }
        if self.flush_lease_seconds == 0 {
            return Err(ConfigError::ZeroFlushLease);
        }
        Ok(())
    }

    pub fn window_size_ms(&self) -> i64 {
        i64::from(self.window_size_seconds) * 1000
    }

    pub fn flush_lease_ms(&self) -> i64 {
        i64::from(self.flush_lease_seconds) * 1000
    }
}
