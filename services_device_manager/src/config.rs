use serde::{Deserialize, Serialize};

/// Registry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registration past this many live devices is rejected
    pub max_devices: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_devices: 1024 }
    }
}
