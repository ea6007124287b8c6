//! RAM-backed virtual block device.

use std::sync::Arc;

use core_types::DeviceType;
use hal::RamDisk;
use services_device_manager::{
    Capability, DetachOutcome, DeviceError, DeviceHandle, DeviceRegistry,
};
use services_storage::SharedBlockDevice;

use crate::hooks::DriverHooks;

pub const DESCRIPTION: &str = "Virtual Block Device";

/// Registers `disk` as a root-level VirtualBlock device (`vblock<n>`).
pub fn attach_vblock(
    registry: &mut DeviceRegistry,
    disk: RamDisk,
) -> Result<DeviceHandle, DeviceError> {
    let shared = Arc::new(SharedBlockDevice::new(disk));
    let builder = registry
        .new_device()
        .device_type(DeviceType::VirtualBlock)
        .description(DESCRIPTION)
        .capability(Capability::Block(shared.clone()))
        .private(shared)
        .hooks(Arc::new(DriverHooks::new("in memory")));
    registry.register_device(builder)
}

/// Registers a virtual block device holding a copy of `image`.
pub fn attach_vblock_image(
    registry: &mut DeviceRegistry,
    image: &[u8],
    sector_size: usize,
) -> Result<DeviceHandle, DeviceError> {
    attach_vblock(registry, RamDisk::from_image(image, sector_size))
}

/// Runs `f` against the RAM disk behind a vblock device.
pub fn with_ram_disk<R>(
    registry: &DeviceRegistry,
    handle: DeviceHandle,
    f: impl FnOnce(&mut RamDisk) -> R,
) -> Option<R> {
    registry
        .private_state::<Arc<SharedBlockDevice<RamDisk>>>(handle)
        .map(|shared| shared.with_device(f))
}

pub fn detach_vblock(
    registry: &mut DeviceRegistry,
    handle: DeviceHandle,
) -> Result<DetachOutcome, DeviceError> {
    registry.unregister_device(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use services_device_manager::RegistryConfig;

    #[test]
    fn test_vblock_is_named_and_block_capable() {
        let mut registry = DeviceRegistry::new(RegistryConfig::default());
        let handle = attach_vblock(&mut registry, RamDisk::new(16)).unwrap();

        assert_eq!(registry.name(handle), Some("vblock0"));
        assert_eq!(registry.device_type(handle), Some(DeviceType::VirtualBlock));
        let block = registry.block(handle).unwrap();
        assert_eq!(block.total_sectors(), 16);
        assert_eq!(block.sector_size(), 512);
    }

    #[test]
    fn test_vblock_write_reaches_ram_disk() {
        let mut registry = DeviceRegistry::new(RegistryConfig::default());
        let handle = attach_vblock(&mut registry, RamDisk::new(4)).unwrap();

        let data = vec![0xAB; 512];
        registry.block(handle).unwrap().write(2, &data, 1).unwrap();

        let byte = with_ram_disk(&registry, handle, |disk| disk.as_bytes()[2 * 512]);
        assert_eq!(byte, Some(0xAB));
    }

    #[test]
    fn test_vblock_image_and_detach() {
        let mut registry = DeviceRegistry::new(RegistryConfig::default());
        let handle = attach_vblock_image(&mut registry, b"hello", 512).unwrap();

        let mut buf = vec![0u8; 512];
        registry.block(handle).unwrap().read(0, &mut buf, 1).unwrap();
        assert_eq!(&buf[..5], b"hello");

        assert_eq!(detach_vblock(&mut registry, handle), Ok(DetachOutcome::Removed));
        assert!(registry.find_device("vblock0").is_none());
        assert!(services_logger::global().contains("Uninit Virtual Block Device in memory (vblock0)"));
    }
}
