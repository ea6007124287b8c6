use serde::{Deserialize, Serialize};

/// Real-time clock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// Legacy IRQ line of the periodic interrupt
    pub irq_line: u8,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self { irq_line: 8 }
    }
}

/// Programmable interval timer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitConfig {
    /// Channel 0 interrupt rate
    pub frequency_hz: u32,
    pub irq_line: u8,
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000,
            irq_line: 0,
        }
    }
}

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baud: 38_400 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(RtcConfig::default().irq_line, 8);
        assert_eq!(PitConfig::default().frequency_hz, 1000);
        assert_eq!(SerialConfig::default().baud, 38_400);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let pit: PitConfig = serde_json::from_str(r#"{"frequency_hz": 100}"#).unwrap();
        assert_eq!(pit.frequency_hz, 100);
        assert_eq!(pit.irq_line, 0);

        let rtc: RtcConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(rtc, RtcConfig::default());
    }
}
