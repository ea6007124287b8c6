//! Layered-device plumbing shared by partition tables, partitions and
//! filesystems.
//!
//! A layer is attached over exactly one parent and holds one reference on
//! it for as long as the layer itself exists.

use std::sync::Arc;

use services_device_manager::{
    DetachOutcome, DeviceBuilder, DeviceError, DeviceHandle, DeviceInfo, DeviceLifecycle,
    DeviceRegistry,
};
use services_logger::{LogEntry, LogLevel};

const LOG_TARGET: &str = "storage";

/// Lifecycle hooks that announce a layer coming up and going down.
#[derive(Debug, Clone)]
pub struct LayerHooks {
    parent_name: String,
}

impl LayerHooks {
    pub fn new(parent_name: impl Into<String>) -> Self {
        Self {
            parent_name: parent_name.into(),
        }
    }

    fn announce(&self, verb: &str, device: &DeviceInfo) {
        let entry = LogEntry::new(
            LogLevel::Info,
            LOG_TARGET,
            format!(
                "{} {} on {} ({})",
                verb, device.description, self.parent_name, device.name
            ),
        )
        .with_source(device.id)
        .with_field("type", device.device_type);
        services_logger::global().log(entry);
    }
}

impl DeviceLifecycle for LayerHooks {
    fn init(&self, device: &DeviceInfo) -> Result<(), DeviceError> {
        self.announce("Init", device);
        Ok(())
    }

    fn uninit(&self, device: &DeviceInfo) {
        self.announce("Uninit", device);
    }
}

/// Attaches `builder` over `parent` and takes a reference on the parent.
pub fn attach_layer(
    registry: &mut DeviceRegistry,
    parent: DeviceHandle,
    builder: DeviceBuilder,
) -> Result<DeviceHandle, DeviceError> {
    let parent_name = registry
        .name(parent)
        .ok_or(DeviceError::ParentNotFound)?
        .to_string();
    attach_layer_with_hooks(
        registry,
        parent,
        builder,
        Arc::new(LayerHooks::new(parent_name)),
    )
}

/// [`attach_layer`] with the caller's own lifecycle hooks.
pub fn attach_layer_with_hooks(
    registry: &mut DeviceRegistry,
    parent: DeviceHandle,
    builder: DeviceBuilder,
    hooks: Arc<dyn DeviceLifecycle>,
) -> Result<DeviceHandle, DeviceError> {
    let handle = registry.attach_device(builder.parent(parent).hooks(hooks))?;
    registry.increment_refcount(parent)?;
    Ok(handle)
}

/// Detaches a layer; once it is gone, gives its reference on the parent
/// back.
///
/// Parents are released through [`DeviceRegistry::detach_device`], so a
/// parent whose owner already let go is torn down here, and its own
/// reference on the device below is returned in turn.
pub fn detach_layer(
    registry: &mut DeviceRegistry,
    handle: DeviceHandle,
) -> Result<DetachOutcome, DeviceError> {
    let mut below = registry.parent(handle);
    let outcome = registry.detach_device(handle)?;
    if outcome != DetachOutcome::Removed {
        return Ok(outcome);
    }
    while let Some(parent) = below {
        below = registry.parent(parent);
        if registry.detach_device(parent)? != DetachOutcome::Removed {
            break;
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::register_disk;
    use core_types::DeviceType;
    use hal::RamDisk;
    use services_device_manager::{Capability, PartitionTableCapability, PartitionType};

    struct EmptyTable;

    impl PartitionTableCapability for EmptyTable {
        fn table_name(&self) -> &'static str {
            "mbr"
        }

        fn partition_count(&self) -> u32 {
            0
        }

        fn sector_count(&self, _index: u32) -> u32 {
            0
        }

        fn lba(&self, _index: u32) -> u64 {
            0
        }

        fn partition_type(&self, _index: u32) -> Option<PartitionType> {
            None
        }
    }

    fn table_builder(registry: &DeviceRegistry) -> DeviceBuilder {
        registry
            .new_device()
            .device_type(DeviceType::PartitionTable)
            .description("Layer Test Table")
            .capability(Capability::PartitionTable(Arc::new(EmptyTable)))
    }

    #[test]
    fn test_attach_layer_takes_parent_reference() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "layerdisk0", RamDisk::new(8));

        let builder = table_builder(&registry);
        let table = attach_layer(&mut registry, disk, builder).unwrap();
        assert_eq!(registry.refcount(disk), Some(2));
        assert_eq!(registry.parent(table), Some(disk));

        let init_line = format!(
            "Init Layer Test Table on layerdisk0 ({})",
            registry.name(table).unwrap()
        );
        assert!(services_logger::global().contains(&init_line));

        assert_eq!(detach_layer(&mut registry, table), Ok(DetachOutcome::Removed));
        assert_eq!(registry.refcount(disk), Some(1));
        assert!(services_logger::global().contains("Uninit Layer Test Table on layerdisk0"));
    }

    #[test]
    fn test_detach_layer_keeps_parent_while_referenced() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "layerdisk1", RamDisk::new(8));
        let builder = table_builder(&registry);
        let table = attach_layer(&mut registry, disk, builder).unwrap();
        registry.increment_refcount(table).unwrap();

        assert_eq!(
            detach_layer(&mut registry, table),
            Ok(DetachOutcome::StillReferenced(1))
        );
        assert_eq!(registry.refcount(disk), Some(2));
    }

    #[test]
    fn test_owner_released_first_parent_goes_with_last_layer() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "layerdisk3", RamDisk::new(8));
        let builder = table_builder(&registry);
        let table = attach_layer(&mut registry, disk, builder).unwrap();

        assert_eq!(
            registry.unregister_device(disk),
            Ok(DetachOutcome::StillReferenced(1))
        );
        assert!(registry.contains(disk));

        assert_eq!(detach_layer(&mut registry, table), Ok(DetachOutcome::Removed));
        assert!(!registry.contains(disk));
        assert_eq!(registry.find_device("layerdisk3"), None);
        assert_eq!(registry.device_count(), 0);
        assert_eq!(registry.unregister_device(disk), Err(DeviceError::NotFound));
    }

    #[test]
    fn test_attach_layer_unknown_parent() {
        let mut registry = DeviceRegistry::default();
        let disk = register_disk(&mut registry, "layerdisk2", RamDisk::new(8));
        registry.detach_device(disk).unwrap();

        let builder = table_builder(&registry);
        let result = attach_layer(&mut registry, disk, builder);
        assert_eq!(result, Err(DeviceError::ParentNotFound));
    }
}
