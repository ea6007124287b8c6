//! Filesystem drivers.
//!
//! Each format is attached as a Filesystem device over a block-capable
//! device (usually a partition) and holds one reference on it. The driver
//! object is stored both as the device's capability and as its private
//! state, so format-specific operations stay reachable by handle.

pub mod cfs;
pub mod fat;
pub mod initrd;

use std::sync::Arc;

use core_types::DeviceType;
use services_device_manager::{
    Capability, DetachOutcome, DeviceError, DeviceHandle, DeviceRegistry, FilesystemCapability,
};

use crate::block_util::block_of;
use crate::error::FsError;
use crate::layer::{attach_layer, detach_layer};

pub use cfs::Cfs;
pub use fat::Fat;
pub use initrd::Initrd;

/// Attaches `fs` over `device` as a Filesystem device.
pub fn attach_fs<F: FilesystemCapability + 'static>(
    registry: &mut DeviceRegistry,
    device: DeviceHandle,
    fs: Arc<F>,
    description: &str,
) -> Result<DeviceHandle, FsError> {
    let builder = registry
        .new_device()
        .device_type(DeviceType::Filesystem)
        .description(description)
        .capability(Capability::Filesystem(fs.clone()))
        .private(fs);
    Ok(attach_layer(registry, device, builder)?)
}

/// The concrete driver behind a Filesystem device, if it is an `F`.
pub fn filesystem_of<F: FilesystemCapability + 'static>(
    registry: &DeviceRegistry,
    handle: DeviceHandle,
) -> Option<Arc<F>> {
    registry.private_state::<Arc<F>>(handle).cloned()
}

/// Probes `device` for a known format and attaches the first match.
///
/// FAT is tried first, then cfs, then initrd. Returns `Ok(None)` when
/// nothing on the device is recognized.
pub fn attach_filesystem(
    registry: &mut DeviceRegistry,
    device: DeviceHandle,
) -> Result<Option<DeviceHandle>, FsError> {
    let block = block_of(registry, device)?;
    if fat::probe(block.as_ref())? {
        return fat::attach_fat(registry, device).map(Some);
    }
    if cfs::probe(block.as_ref())? {
        return cfs::attach_cfs(registry, device).map(Some);
    }
    if initrd::probe(block.as_ref(), 0)? {
        return initrd::attach_initrd(registry, device).map(Some);
    }
    services_logger::debug(
        "storage",
        format!(
            "No filesystem recognized on {}",
            registry.name(device).unwrap_or_default()
        ),
    );
    Ok(None)
}

/// Detaches a Filesystem device and releases the device under it.
pub fn detach_filesystem(
    registry: &mut DeviceRegistry,
    fs: DeviceHandle,
) -> Result<DetachOutcome, FsError> {
    match registry.device_type(fs) {
        Some(DeviceType::Filesystem) => Ok(detach_layer(registry, fs)?),
        Some(_) => Err(FsError::NotFilesystem(
            registry.name(fs).unwrap_or_default().to_string(),
        )),
        None => Err(DeviceError::NotFound.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_device::SharedBlockDevice;
    use crate::test_support::{fat12_floppy, register_disk};
    use hal::RamDisk;

    #[test]
    fn test_probe_order_prefers_fat() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "fsdisk0", RamDisk::from_image(&fat12_floppy(), 512));

        let fs = attach_filesystem(&mut registry, disk).unwrap().unwrap();
        assert_eq!(registry.filesystem(fs).unwrap().name(), "fat");
        assert!(filesystem_of::<Fat>(&registry, fs).is_some());
        assert!(filesystem_of::<Cfs>(&registry, fs).is_none());
        assert_eq!(registry.refcount(disk), Some(2));

        assert_eq!(detach_filesystem(&mut registry, fs), Ok(DetachOutcome::Removed));
        assert_eq!(registry.refcount(disk), Some(1));
    }

    #[test]
    fn test_probe_finds_cfs_and_initrd() {
        let cfs_disk = Arc::new(SharedBlockDevice::new(RamDisk::new(64)));
        Cfs::new(cfs_disk.clone()).format_volume().unwrap();
        let initrd_disk = Arc::new(SharedBlockDevice::new(RamDisk::new(64)));
        Initrd::new(initrd_disk.clone(), 0).format_volume().unwrap();

        let mut registry = DeviceRegistry::default();
        let first = registry
            .register_device(
                registry
                    .new_device()
                    .device_type(DeviceType::VirtualBlock)
                    .capability(Capability::Block(cfs_disk)),
            )
            .unwrap();
        let second = registry
            .register_device(
                registry
                    .new_device()
                    .device_type(DeviceType::VirtualBlock)
                    .capability(Capability::Block(initrd_disk)),
            )
            .unwrap();

        let cfs = attach_filesystem(&mut registry, first).unwrap().unwrap();
        let initrd = attach_filesystem(&mut registry, second).unwrap().unwrap();
        assert_eq!(registry.filesystem(cfs).unwrap().name(), "cfs");
        assert_eq!(registry.filesystem(initrd).unwrap().name(), "initrd");
        assert_eq!(
            registry.device(initrd).unwrap().description,
            "initrd File System"
        );
    }

    #[test]
    fn test_blank_device_not_recognized() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "fsdisk1", RamDisk::new(16));
        assert_eq!(attach_filesystem(&mut registry, disk), Ok(None));
        assert_eq!(registry.refcount(disk), Some(1));
    }

    #[test]
    fn test_detach_filesystem_rejects_disks() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "fsdisk2", RamDisk::new(16));
        assert_eq!(
            detach_filesystem(&mut registry, disk),
            Err(FsError::NotFilesystem("fsdisk2".to_string()))
        );
    }
}
