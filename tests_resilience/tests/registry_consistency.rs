//! Registry Consistency Tests
//!
//! Lookup, naming and teardown through the public registry API, driven by
//! the real drivers rather than hand-built records.

use core_types::DeviceType;
use device_drivers::{attach_vblock, detach_vblock};
use hal::RamDisk;
use services_device_manager::{
    Capability, DetachOutcome, DeviceError, DeviceRegistry, RegistryConfig, RegistryEvent,
};
use tests_resilience::test_bootstrap;

#[test]
fn test_find_after_register_and_gone_after_detach() {
    let (mut registry, _) = test_bootstrap();
    let handle = attach_vblock(&mut registry, RamDisk::new(8)).unwrap();

    assert_eq!(registry.find_device("vblock0"), Some(handle));
    assert_eq!(registry.refcount(handle), Some(1));

    assert_eq!(detach_vblock(&mut registry, handle), Ok(DetachOutcome::Removed));
    assert_eq!(registry.find_device("vblock0"), None);
    assert!(!registry.contains(handle));
    assert!(registry.block(handle).is_none());
}

#[test]
fn test_detach_with_dependents_keeps_device() {
    let (mut registry, _) = test_bootstrap();
    let handle = attach_vblock(&mut registry, RamDisk::new(8)).unwrap();
    registry.increment_refcount(handle).unwrap();

    assert_eq!(
        detach_vblock(&mut registry, handle),
        Ok(DetachOutcome::StillReferenced(1))
    );
    assert_eq!(registry.find_device("vblock0"), Some(handle));
    assert!(registry.block(handle).is_some());
}

#[test]
fn test_stale_handle_does_not_alias_reused_slot() {
    let (mut registry, _) = test_bootstrap();
    let first = attach_vblock(&mut registry, RamDisk::new(4)).unwrap();
    detach_vblock(&mut registry, first).unwrap();

    let second = attach_vblock(&mut registry, RamDisk::new(4)).unwrap();
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);
    assert_eq!(registry.name(first), None);
    assert_eq!(registry.name(second), Some("vblock1"));
    assert_eq!(registry.detach_device(first), Err(DeviceError::NotFound));
}

#[test]
fn test_name_collision_inserts_nothing() {
    let (mut registry, _) = test_bootstrap();
    registry
        .register_device(
            registry
                .new_device()
                .device_type(DeviceType::Bridge)
                .name("hostbridge"),
        )
        .unwrap();

    let result = registry.register_device(
        registry
            .new_device()
            .device_type(DeviceType::Bridge)
            .name("hostbridge"),
    );
    assert_eq!(result, Err(DeviceError::NameCollision("hostbridge".to_string())));
    assert_eq!(registry.device_count(), 1);
    assert!(registry
        .audit_log()
        .has_event(|e| matches!(e, RegistryEvent::Rejected { name, .. } if name == "hostbridge")));
}

#[test]
fn test_capability_must_fit_devicetype() {
    let (mut registry, _) = test_bootstrap();
    let result = registry.register_device(
        registry
            .new_device()
            .device_type(DeviceType::Disk)
            .capability(Capability::None),
    );
    assert!(matches!(result, Err(DeviceError::CapabilityMismatch { .. })));
    assert_eq!(registry.device_count(), 0);
}

#[test]
fn test_registry_capacity_from_config() {
    let config: RegistryConfig = serde_json::from_str(r#"{"max_devices": 2}"#).unwrap();
    let mut registry = DeviceRegistry::new(config);
    attach_vblock(&mut registry, RamDisk::new(1)).unwrap();
    attach_vblock(&mut registry, RamDisk::new(1)).unwrap();

    assert_eq!(
        attach_vblock(&mut registry, RamDisk::new(1)),
        Err(DeviceError::RegistryFull(2))
    );
}

#[test]
#[should_panic(expected = "refcount underflow")]
fn test_refcount_underflow_is_fatal() {
    let (mut registry, _) = test_bootstrap();
    let handle = registry
        .register_device(
            registry
                .new_device()
                .device_type(DeviceType::Nic)
                .refcount(0),
        )
        .unwrap();
    let _ = registry.decrement_refcount(handle);
}

#[test]
fn test_devices_listed_in_registration_order() {
    let (mut registry, _) = test_bootstrap();
    attach_vblock(&mut registry, RamDisk::new(1)).unwrap();
    registry
        .register_device(registry.new_device().device_type(DeviceType::Keyboard))
        .unwrap();
    attach_vblock(&mut registry, RamDisk::new(1)).unwrap();

    let names: Vec<String> = registry.devices().into_iter().map(|d| d.name).collect();
    assert_eq!(names, ["vblock0", "kbd0", "vblock1"]);
    assert_eq!(registry.find_devices_by_type(DeviceType::VirtualBlock).len(), 2);
}
