use serde::{Deserialize, Serialize};

/// PCI scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PciScanConfig {
    /// Highest bus number visited
    pub max_bus: u8,
}

impl Default for PciScanConfig {
    fn default() -> Self {
        Self { max_bus: 255 }
    }
}
