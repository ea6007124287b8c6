//! Intel i440FX host bridge, found by PCI class scan.

use std::sync::Arc;

use core_types::DeviceType;
use hal::PciConfigSpace;
use services_bus::pci::{BRIDGE_SUBCLASS_HOST, CLASS_BRIDGE};
use services_bus::{scan, PciDescriptor, PciFilter, PciScanConfig};
use services_device_manager::{DeviceError, DeviceHandle, DeviceRegistry};

use crate::hooks::DriverHooks;

pub const DESCRIPTION: &str = "Intel i440FX PCI Bridge";

/// Registers every PCI host bridge as a Bridge device named `bridge<n>`.
///
/// The PCI descriptor is kept as the device's private state.
pub fn register_i440fx<C: PciConfigSpace + ?Sized>(
    registry: &mut DeviceRegistry,
    config: &mut C,
    scan_config: &PciScanConfig,
) -> Result<Vec<DeviceHandle>, DeviceError> {
    let mut found = Vec::new();
    scan(
        config,
        scan_config,
        &PciFilter::class(CLASS_BRIDGE, BRIDGE_SUBCLASS_HOST),
        |descriptor| found.push(*descriptor),
    );

    found
        .into_iter()
        .map(|descriptor| {
            let hooks = DriverHooks::new(format!(
                "at IRQ {} vendor {:#06x} device {:#06x}",
                descriptor.irq_line, descriptor.vendor, descriptor.device_id
            ));
            let builder = registry
                .new_device()
                .device_type(DeviceType::Bridge)
                .description(DESCRIPTION)
                .pci_location(descriptor.location)
                .private(descriptor)
                .hooks(Arc::new(hooks));
            registry.register_device(builder)
        })
        .collect()
}

pub fn pci_descriptor(registry: &DeviceRegistry, handle: DeviceHandle) -> Option<PciDescriptor> {
    registry.private_state::<PciDescriptor>(handle).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::PciLocation;
    use services_bus::{FakePciBus, FakePciFunction};
    use services_device_manager::RegistryConfig;

    #[test]
    fn test_registers_host_bridges_only() {
        let mut bus = FakePciBus::new();
        bus.insert(
            PciLocation::new(0, 0, 0),
            FakePciFunction::new(0x8086, 0x1237, CLASS_BRIDGE, BRIDGE_SUBCLASS_HOST),
        );
        bus.insert(
            PciLocation::new(0, 1, 0),
            FakePciFunction::new(0x8086, 0x7000, CLASS_BRIDGE, 0x01),
        );
        let mut registry = DeviceRegistry::new(RegistryConfig::default());

        let handles = register_i440fx(&mut registry, &mut bus, &PciScanConfig::default()).unwrap();
        assert_eq!(handles.len(), 1);

        let info = registry.device(handles[0]).unwrap();
        assert_eq!(info.name, "bridge0");
        assert_eq!(info.pci, Some(PciLocation::new(0, 0, 0)));
        assert_eq!(pci_descriptor(&registry, handles[0]).unwrap().device_id, 0x1237);
        assert!(services_logger::global()
            .contains("Init Intel i440FX PCI Bridge at IRQ 0 vendor 0x8086 device 0x1237 (bridge0)"));
    }

    #[test]
    fn test_empty_bus_registers_nothing() {
        let mut bus = FakePciBus::new();
        let mut registry = DeviceRegistry::new(RegistryConfig::default());
        let handles = register_i440fx(
            &mut registry,
            &mut bus,
            &PciScanConfig { max_bus: 0 },
        )
        .unwrap();
        assert!(handles.is_empty());
        assert_eq!(registry.device_count(), 0);
    }
}
