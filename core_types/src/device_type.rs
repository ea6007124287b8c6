//! Devicetype tags
//!
//! The devicetype is the only thing that decides which capability table a
//! device exposes. Two drivers of the same devicetype still have their own
//! init/uninit hooks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of device categories known to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Bridge,
    Disk,
    /// RAM-backed block device
    VirtualBlock,
    Filesystem,
    Partition,
    PartitionTable,
    Console,
    Serial,
    Mouse,
    Keyboard,
    Rtc,
    Speaker,
    Pit,
    Nic,
}

impl DeviceType {
    /// All devicetypes, in declaration order
    pub const ALL: [DeviceType; 14] = [
        DeviceType::Bridge,
        DeviceType::Disk,
        DeviceType::VirtualBlock,
        DeviceType::Filesystem,
        DeviceType::Partition,
        DeviceType::PartitionTable,
        DeviceType::Console,
        DeviceType::Serial,
        DeviceType::Mouse,
        DeviceType::Keyboard,
        DeviceType::Rtc,
        DeviceType::Speaker,
        DeviceType::Pit,
        DeviceType::Nic,
    ];

    /// Name prefix used when the registry assigns `<prefix><n>` names
    pub const fn name_prefix(self) -> &'static str {
        match self {
            DeviceType::Bridge => "bridge",
            DeviceType::Disk => "disk",
            DeviceType::VirtualBlock => "vblock",
            DeviceType::Filesystem => "fs",
            DeviceType::Partition => "partition",
            DeviceType::PartitionTable => "pt",
            DeviceType::Console => "console",
            DeviceType::Serial => "serial",
            DeviceType::Mouse => "mouse",
            DeviceType::Keyboard => "kbd",
            DeviceType::Rtc => "rtc",
            DeviceType::Speaker => "speaker",
            DeviceType::Pit => "pit",
            DeviceType::Nic => "nic",
        }
    }

    /// Returns true for devicetypes whose capability table carries the Block shape
    pub const fn is_block(self) -> bool {
        matches!(
            self,
            DeviceType::Disk | DeviceType::VirtualBlock | DeviceType::Partition
        )
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_prefix())
    }
}
