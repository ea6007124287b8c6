//! Partitions.
//!
//! A partition is attached over its partition table and holds a reference
//! on it. Its Block capability forwards to the disk underneath the table,
//! offset by the partition's first sector and bounded by its length.

use std::sync::Arc;

use core_types::DeviceType;
use hal::BlockError;
use services_device_manager::{
    BlockCapability, Capability, DetachOutcome, DeviceError, DeviceHandle, DeviceRegistry,
    PartitionCapability,
};

use crate::block_util::block_of;
use crate::error::FsError;
use crate::layer::{attach_layer, detach_layer};

/// Block window onto a slice of a disk.
pub struct PartitionBlock {
    disk: Arc<dyn BlockCapability>,
    disk_handle: DeviceHandle,
    lba: u64,
    sectors: u32,
}

impl PartitionBlock {
    pub fn new(
        disk: Arc<dyn BlockCapability>,
        disk_handle: DeviceHandle,
        lba: u64,
        sectors: u32,
    ) -> Self {
        Self {
            disk,
            disk_handle,
            lba,
            sectors,
        }
    }

    fn translate(&self, lba: u64, count: u32) -> Result<u64, BlockError> {
        let end = lba.checked_add(count as u64).ok_or(BlockError::OutOfBounds)?;
        if end > self.sectors as u64 {
            return Err(BlockError::OutOfBounds);
        }
        self.lba.checked_add(lba).ok_or(BlockError::OutOfBounds)
    }
}

impl BlockCapability for PartitionBlock {
    fn read(&self, lba: u64, buf: &mut [u8], count: u32) -> Result<(), BlockError> {
        let absolute = self.translate(lba, count)?;
        self.disk.read(absolute, buf, count)
    }

    fn write(&self, lba: u64, buf: &[u8], count: u32) -> Result<(), BlockError> {
        let absolute = self.translate(lba, count)?;
        self.disk.write(absolute, buf, count)
    }

    fn sector_size(&self) -> u16 {
        self.disk.sector_size()
    }

    fn total_sectors(&self) -> u32 {
        self.sectors
    }
}

impl PartitionCapability for PartitionBlock {
    fn underlying_device(&self) -> DeviceHandle {
        self.disk_handle
    }

    fn lba_offset(&self) -> u64 {
        self.lba
    }
}

/// Attaches entry `index` of `table` as a partition device.
pub fn attach_partition(
    registry: &mut DeviceRegistry,
    table: DeviceHandle,
    index: u32,
) -> Result<DeviceHandle, FsError> {
    let table_name = registry
        .name(table)
        .ok_or(DeviceError::NotFound)?
        .to_string();
    let entries = registry
        .partition_table(table)
        .ok_or_else(|| FsError::NotPartitionTable(table_name.clone()))?;
    let sectors = entries.sector_count(index);
    if sectors == 0 {
        return Err(FsError::EmptyPartition(index));
    }
    let lba = entries.lba(index);

    let disk_handle = registry.parent(table).ok_or(DeviceError::ParentNotFound)?;
    let disk = block_of(registry, disk_handle)?;
    let partition = Arc::new(PartitionBlock::new(disk, disk_handle, lba, sectors));

    let builder = registry
        .new_device()
        .device_type(DeviceType::Partition)
        .description("Partition")
        .capability(Capability::Partition {
            block: partition.clone(),
            partition,
        })
        .private(index);
    let handle = attach_layer(registry, table, builder)?;
    services_logger::debug(
        "storage",
        format!(
            "{} is entry {} of {} at lba {}",
            registry.name(handle).unwrap_or_default(),
            index,
            table_name,
            lba
        ),
    );
    Ok(handle)
}

/// Attaches every non-empty entry of `table`, in table order.
pub fn attach_partitions(
    registry: &mut DeviceRegistry,
    table: DeviceHandle,
) -> Result<Vec<DeviceHandle>, FsError> {
    let entries = registry.partition_table(table).ok_or_else(|| {
        FsError::NotPartitionTable(registry.name(table).unwrap_or_default().to_string())
    })?;
    let mut attached = Vec::new();
    for index in 0..entries.partition_count() {
        if entries.sector_count(index) > 0 {
            attached.push(attach_partition(registry, table, index)?);
        }
    }
    Ok(attached)
}

/// Table entry a partition device was attached from.
pub fn partition_index(registry: &DeviceRegistry, partition: DeviceHandle) -> Option<u32> {
    registry.private_state::<u32>(partition).copied()
}

/// Detaches a partition device and releases its table.
pub fn detach_partition(
    registry: &mut DeviceRegistry,
    partition: DeviceHandle,
) -> Result<DetachOutcome, FsError> {
    match registry.device_type(partition) {
        Some(DeviceType::Partition) => Ok(detach_layer(registry, partition)?),
        Some(_) => Err(FsError::NotPartition(
            registry.name(partition).unwrap_or_default().to_string(),
        )),
        None => Err(DeviceError::NotFound.into()),
    }
}

/// Detaches every partition attached over `table`; returns how many were
/// removed.
pub fn detach_partitions(
    registry: &mut DeviceRegistry,
    table: DeviceHandle,
) -> Result<usize, FsError> {
    let partitions: Vec<DeviceHandle> = registry
        .children_of(table)
        .into_iter()
        .filter(|&child| registry.device_type(child) == Some(DeviceType::Partition))
        .collect();
    let mut removed = 0;
    for partition in partitions {
        if detach_partition(registry, partition)? == DetachOutcome::Removed {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_util;
    use crate::partition_table::attach_partition_table;
    use crate::test_support::{mbr_image, register_disk};
    use hal::RamDisk;

    fn partitioned(registry: &mut DeviceRegistry, name: &str) -> (DeviceHandle, DeviceHandle) {
        let image = mbr_image(64, &[(0x83, 8, 16), (0x00, 0, 0), (0x0B, 32, 8)]);
        let disk = register_disk(registry, name, RamDisk::from_image(&image, 512));
        let table = attach_partition_table(registry, disk).unwrap().unwrap();
        (disk, table)
    }

    #[test]
    fn test_attach_partitions_skips_empty_entries() {
        let mut registry = DeviceRegistry::default();
        let (disk, table) = partitioned(&mut registry, "partdisk0");

        let partitions = attach_partitions(&mut registry, table).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(registry.refcount(table), Some(3));
        assert_eq!(registry.refcount(disk), Some(2));

        assert_eq!(partition_index(&registry, partitions[0]), Some(0));
        assert_eq!(partition_index(&registry, partitions[1]), Some(2));

        let caps = registry.partition(partitions[1]).unwrap();
        assert_eq!(caps.underlying_device(), disk);
        assert_eq!(caps.lba_offset(), 32);
        assert_eq!(registry.block(partitions[1]).unwrap().total_sectors(), 8);
    }

    #[test]
    fn test_partition_io_is_offset_and_bounded() {
        let mut registry = DeviceRegistry::default();
        let (disk, table) = partitioned(&mut registry, "partdisk1");
        let partition = attach_partition(&mut registry, table, 0).unwrap();
        let block = registry.block(partition).unwrap();

        block_util::write_sectors(block.as_ref(), 3, b"partition data").unwrap();
        let mut raw = [0u8; 14];
        block_util::read_sectors(registry.block(disk).unwrap().as_ref(), 11, &mut raw).unwrap();
        assert_eq!(&raw, b"partition data");

        let mut sector = [0u8; 512];
        assert_eq!(block.read(16, &mut sector, 1), Err(BlockError::OutOfBounds));
        assert_eq!(block.write(15, &[0u8; 1024], 2), Err(BlockError::OutOfBounds));
        assert!(block.read(15, &mut sector, 1).is_ok());
    }

    #[test]
    fn test_window_near_address_limit_fails_cleanly() {
        let disk = Arc::new(crate::shared_device::SharedBlockDevice::new(RamDisk::new(8)));
        let mut registry = DeviceRegistry::default();
        let handle = register_disk(&mut registry, "partdisk5", RamDisk::new(8));
        let window = PartitionBlock::new(disk, handle, u64::MAX - 1, 16);

        let mut sector = [0u8; 512];
        assert_eq!(window.read(0, &mut sector, 1), Err(BlockError::OutOfBounds));
        assert_eq!(window.read(4, &mut sector, 1), Err(BlockError::OutOfBounds));
    }

    #[test]
    fn test_empty_entry_rejected() {
        let mut registry = DeviceRegistry::default();
        let (_, table) = partitioned(&mut registry, "partdisk2");
        assert_eq!(
            attach_partition(&mut registry, table, 1),
            Err(FsError::EmptyPartition(1))
        );
        assert_eq!(registry.refcount(table), Some(1));
    }

    #[test]
    fn test_detach_partitions_restores_counts() {
        let mut registry = DeviceRegistry::default();
        let (disk, table) = partitioned(&mut registry, "partdisk3");
        attach_partitions(&mut registry, table).unwrap();

        assert_eq!(detach_partitions(&mut registry, table), Ok(2));
        assert_eq!(registry.refcount(table), Some(1));
        assert!(registry.children_of(table).is_empty());

        crate::partition_table::detach_partition_table(&mut registry, table).unwrap();
        assert_eq!(registry.refcount(disk), Some(1));
        assert!(!registry.contains(table));
    }

    #[test]
    fn test_attach_over_non_table() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "partdisk4", RamDisk::new(8));
        assert_eq!(
            attach_partition(&mut registry, disk, 0),
            Err(FsError::NotPartitionTable("partdisk4".to_string()))
        );
    }
}
