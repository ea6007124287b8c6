//! Capability tables.
//!
//! One trait per device category. A driver implements the trait for its
//! state object and hands the registry an `Arc` of it wrapped in the
//! [`Capability`] variant that matches the device's [`DeviceType`]. The
//! registry refuses any other pairing, so a caller holding a `Block`
//! capability never sees a serial port through it.

use std::fmt;
use std::sync::Arc;

use core_types::DeviceType;
use hal::BlockError;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::registry::DeviceHandle;

/// Sector-addressed storage.
pub trait BlockCapability: Send + Sync {
    /// Reads `count` sectors starting at `lba` into `buf`.
    fn read(&self, lba: u64, buf: &mut [u8], count: u32) -> Result<(), BlockError>;

    /// Writes `count` sectors starting at `lba` from `buf`.
    fn write(&self, lba: u64, buf: &[u8], count: u32) -> Result<(), BlockError>;

    fn sector_size(&self) -> u16;

    fn total_sectors(&self) -> u32;
}

/// Byte-oriented serial line.
pub trait SerialCapability: Send + Sync {
    fn write(&self, bytes: &[u8]);

    /// Blocks until a byte arrives.
    fn read_char(&self) -> u8;

    fn char_available(&self) -> bool;

    fn write_char(&self, byte: u8);
}

/// Text console.
pub trait ConsoleCapability: Send + Sync {
    fn write(&self, text: &str);

    /// Moves the cursor. Returns false if the console cannot position.
    fn set_position(&self, x: u16, y: u16) -> bool;
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_dir: true,
        }
    }
}

pub type DirectoryListing = Vec<DirEntry>;

/// Mounted filesystem.
pub trait FilesystemCapability: Send + Sync {
    /// Short format name ("fat", "cfs", "initrd").
    fn name(&self) -> &str;

    /// Writes an empty filesystem over the whole underlying device.
    fn format(&self) -> Result<(), DeviceError>;

    fn list_dir(&self) -> Result<DirectoryListing, DeviceError>;
}

/// A slice of a disk described by a partition table.
pub trait PartitionCapability: Send + Sync {
    /// The block device the partition's sectors live on.
    fn underlying_device(&self) -> DeviceHandle;

    /// First sector of the partition on the underlying device.
    fn lba_offset(&self) -> u64;
}

/// Partition type as recorded by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionType {
    /// MBR system id byte
    Mbr(u8),
    /// GPT partition type GUID, on-disk byte order
    Gpt([u8; 16]),
}

/// Parsed partition table.
pub trait PartitionTableCapability: Send + Sync {
    /// Table format ("gpt" or "mbr").
    fn table_name(&self) -> &'static str;

    fn partition_count(&self) -> u32;

    /// Sector count of entry `index`; zero for empty or out-of-range entries.
    fn sector_count(&self, index: u32) -> u32;

    /// First sector of entry `index` on the underlying disk.
    fn lba(&self, index: u32) -> u64;

    fn partition_type(&self, index: u32) -> Option<PartitionType>;
}

/// Calendar reading from the RTC, raw register values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcTime {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub weekday: u8,
    pub monthday: u8,
    pub month: u8,
    pub year: u8,
    pub century: u8,
}

/// Callback run from the periodic RTC interrupt.
pub type RtcCallback = Box<dyn Fn() + Send + Sync>;

/// Real-time clock.
pub trait RtcCapability: Send + Sync {
    /// Returns a reading that was not torn by a concurrent update.
    fn read_time(&self) -> RtcTime;

    /// Appends `callback` to the tick subscriber list.
    fn subscribe(&self, callback: RtcCallback);
}

/// PC speaker.
pub trait SpeakerCapability: Send + Sync {
    /// Plays a tone, returning when it has finished.
    fn beep(&self, frequency_hz: u32, duration_ms: u32);
}

/// Programmable interval timer.
pub trait PitCapability: Send + Sync {
    /// Interrupts observed since the timer was programmed.
    fn tick_count(&self) -> u64;

    fn frequency_hz(&self) -> u32;
}

/// Capability payload of a device, one variant per category.
#[derive(Clone)]
pub enum Capability {
    /// Devicetypes without an operation set
    None,
    Block(Arc<dyn BlockCapability>),
    Serial(Arc<dyn SerialCapability>),
    Console(Arc<dyn ConsoleCapability>),
    Filesystem(Arc<dyn FilesystemCapability>),
    /// Partitions carry the block shape for I/O plus their placement
    Partition {
        block: Arc<dyn BlockCapability>,
        partition: Arc<dyn PartitionCapability>,
    },
    PartitionTable(Arc<dyn PartitionTableCapability>),
    Rtc(Arc<dyn RtcCapability>),
    Speaker(Arc<dyn SpeakerCapability>),
    Pit(Arc<dyn PitCapability>),
}

impl Capability {
    /// Variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::None => "none",
            Capability::Block(_) => "block",
            Capability::Serial(_) => "serial",
            Capability::Console(_) => "console",
            Capability::Filesystem(_) => "filesystem",
            Capability::Partition { .. } => "partition",
            Capability::PartitionTable(_) => "partition_table",
            Capability::Rtc(_) => "rtc",
            Capability::Speaker(_) => "speaker",
            Capability::Pit(_) => "pit",
        }
    }

    /// Returns true if this variant is the shape `device_type` requires.
    pub fn fits(&self, device_type: DeviceType) -> bool {
        matches!(
            (device_type, self),
            (DeviceType::Disk | DeviceType::VirtualBlock, Capability::Block(_))
                | (DeviceType::Partition, Capability::Partition { .. })
                | (DeviceType::PartitionTable, Capability::PartitionTable(_))
                | (DeviceType::Filesystem, Capability::Filesystem(_))
                | (DeviceType::Serial, Capability::Serial(_))
                | (DeviceType::Console, Capability::Console(_))
                | (DeviceType::Rtc, Capability::Rtc(_))
                | (DeviceType::Speaker, Capability::Speaker(_))
                | (DeviceType::Pit, Capability::Pit(_))
                | (
                    DeviceType::Bridge
                        | DeviceType::Mouse
                        | DeviceType::Keyboard
                        | DeviceType::Nic,
                    Capability::None
                )
        )
    }

    /// The block shape, for disks and partitions.
    pub fn as_block(&self) -> Option<Arc<dyn BlockCapability>> {
        match self {
            Capability::Block(block) | Capability::Partition { block, .. } => {
                Some(Arc::clone(block))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability::{}", self.kind())
    }
}
