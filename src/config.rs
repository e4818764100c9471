//! Runtime configuration
//!
//! Everything here is fixed when the runtime is built. Loaded from JSON so
//! a boot image can carry it next to the kernel.

use crate::error::Result;
use crate::format::PointerWidth;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default file the dump task writes to
pub const DEFAULT_DUMP_PATH: &str = "default.profraw";

/// Default dump period (ms)
pub const DEFAULT_DUMP_PERIOD_MS: u64 = 1000;

/// Profile runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Pointer width of the instrumented target; selects magic and record layout
    pub pointer_width: PointerWidth,
    /// Set the context-sensitive variant bit in the header version
    pub context_sensitive: bool,
    /// Largest snapshot the host allocator will hand out (None = no limit)
    pub max_snapshot_bytes: Option<usize>,
    /// Periodic dump settings
    pub dump: DumpConfig,
}

impl ProfileConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Periodic dump settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Where the raw profile is written
    pub path: PathBuf,
    /// Time between dumps (ms)
    pub period_ms: u64,
}

impl DumpConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DUMP_PATH),
            period_ms: DEFAULT_DUMP_PERIOD_MS,
        }
    }
}
