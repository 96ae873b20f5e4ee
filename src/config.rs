//! Configuration for the middlewares.

use crate::codec::Level;
use crate::pool::DEFAULT_MAX_IDLE;
use serde::{Deserialize, Serialize};

/// Compression configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compression level, 1 (fastest) to 9 (best); -1 or anything out of
    /// range selects the default level.
    #[serde(default = "default_level")]
    pub level: i32,

    /// Idle codecs kept per (encoding, level) slot.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            max_idle: default_max_idle(),
        }
    }
}

fn default_level() -> i32 {
    Level::DEFAULT_SENTINEL
}

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE
}

impl CompressionConfig {
    /// The configured level, normalized.
    pub fn level(&self) -> Level {
        Level::from_i32(self.level).normalize()
    }
}

/// Describes the application served behind the middlewares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Application name, used to tag log lines.
    #[serde(default)]
    pub name: String,
    /// Application version.
    #[serde(default)]
    pub version: String,
    /// Path prefix the application is mounted under.
    #[serde(default)]
    pub base_path: String,
}
