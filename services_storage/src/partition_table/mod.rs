//! Partition-table layer.
//!
//! A partition table is a device of its own, attached over the disk it was
//! read from. It answers how many entries the table holds and where each
//! one lives; the partitions themselves are attached separately by
//! [`crate::partition`].

pub mod gpt;
pub mod mbr;

use std::sync::Arc;

use core_types::DeviceType;
use services_device_manager::{
    BlockCapability, Capability, DetachOutcome, DeviceHandle, DeviceRegistry,
    PartitionTableCapability, PartitionType,
};

use crate::block_util::block_of;
use crate::error::FsError;
use crate::layer::{attach_layer, detach_layer};

/// One slot of a partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    /// First sector on the disk
    pub lba: u64,
    /// Zero for an unused slot
    pub sectors: u32,
    pub kind: PartitionType,
}

impl PartitionEntry {
    pub fn is_empty(&self) -> bool {
        self.sectors == 0
    }
}

/// Partition table read off a disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    name: &'static str,
    entries: Vec<PartitionEntry>,
}

impl ParsedTable {
    pub fn new(name: &'static str, entries: Vec<PartitionEntry>) -> Self {
        Self { name, entries }
    }

    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    fn entry(&self, index: u32) -> Option<&PartitionEntry> {
        self.entries.get(index as usize)
    }

    fn description(&self) -> &'static str {
        match self.name {
            gpt::TABLE_NAME => "GUID Partition Table",
            _ => "MBR Partition Table",
        }
    }
}

impl PartitionTableCapability for ParsedTable {
    fn table_name(&self) -> &'static str {
        self.name
    }

    fn partition_count(&self) -> u32 {
        self.entries.len() as u32
    }

    fn sector_count(&self, index: u32) -> u32 {
        self.entry(index).map_or(0, |entry| entry.sectors)
    }

    fn lba(&self, index: u32) -> u64 {
        self.entry(index).map_or(0, |entry| entry.lba)
    }

    fn partition_type(&self, index: u32) -> Option<PartitionType> {
        self.entry(index)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.kind)
    }
}

/// Reads the partition table of `disk`, GPT first, then MBR.
pub fn read_table(disk: &dyn BlockCapability) -> Result<Option<ParsedTable>, FsError> {
    if let Some(table) = gpt::parse(disk)? {
        return Ok(Some(table));
    }
    Ok(mbr::parse(disk)?)
}

/// Attaches a partition-table device over `block` if it carries one.
///
/// Returns `Ok(None)` for a disk with neither a GPT nor an MBR.
pub fn attach_partition_table(
    registry: &mut DeviceRegistry,
    block: DeviceHandle,
) -> Result<Option<DeviceHandle>, FsError> {
    let disk = block_of(registry, block)?;
    let Some(table) = read_table(disk.as_ref())? else {
        services_logger::debug(
            "storage",
            format!(
                "No partition table on {}",
                registry.name(block).unwrap_or_default()
            ),
        );
        return Ok(None);
    };

    let builder = registry
        .new_device()
        .device_type(DeviceType::PartitionTable)
        .description(table.description())
        .capability(Capability::PartitionTable(Arc::new(table)));
    let handle = attach_layer(registry, block, builder)?;
    Ok(Some(handle))
}

/// Detaches a partition-table device and releases its disk.
pub fn detach_partition_table(
    registry: &mut DeviceRegistry,
    table: DeviceHandle,
) -> Result<DetachOutcome, FsError> {
    match registry.device_type(table) {
        Some(DeviceType::PartitionTable) => Ok(detach_layer(registry, table)?),
        Some(_) => Err(FsError::NotPartitionTable(
            registry.name(table).unwrap_or_default().to_string(),
        )),
        None => Err(services_device_manager::DeviceError::NotFound.into()),
    }
}
