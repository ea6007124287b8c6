use serde::{Deserialize, Serialize};

use crate::LogLevel;

/// Kernel log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Entries below this level are discarded
    pub min_level: LogLevel,
    /// Maximum number of retained entries
    pub capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            capacity: 4096,
        }
    }
}
