//! Device registry.
//!
//! Owns every device record in an arena addressed by generation-checked
//! handles. Layered devices name their parent by handle, never by
//! reference, so a parent can be looked up but not kept alive by a child.
//! The registry tracks reference counts but never touches a parent's count
//! on its own: the driver that layers a device over another increments and
//! decrements the parent explicitly.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use core_types::{DeviceId, DeviceType, PciLocation};

use crate::audit::{RegistryAuditLog, RegistryEvent};
use crate::capability::{
    BlockCapability, Capability, ConsoleCapability, FilesystemCapability, PartitionCapability,
    PartitionTableCapability, PitCapability, RtcCapability, SerialCapability, SpeakerCapability,
};
use crate::config::RegistryConfig;
use crate::error::DeviceError;

const LOG_TARGET: &str = "devicemgr";

/// Stable reference to a registry slot.
///
/// A handle outlives the device it names; once the device is removed the
/// handle resolves to nothing, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle {
    index: u32,
    generation: u32,
}

impl DeviceHandle {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Snapshot of a device's public attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub handle: DeviceHandle,
    pub id: DeviceId,
    pub name: String,
    pub description: String,
    pub device_type: DeviceType,
    pub pci: Option<PciLocation>,
    pub refcount: u32,
    pub parent: Option<DeviceHandle>,
}

/// Per-device init/uninit hooks.
///
/// Two drivers of the same devicetype bring their hardware up differently,
/// so the hooks travel with the device rather than with its type.
pub trait DeviceLifecycle: Send + Sync {
    /// Runs right after insertion. An error removes the device again.
    fn init(&self, _device: &DeviceInfo) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Runs once the count has reached zero, before the payloads are dropped.
    fn uninit(&self, _device: &DeviceInfo) {}
}

/// Result of a detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Count reached zero; the device is gone and its state released.
    Removed,
    /// Dependents remain; the device stays registered with this count.
    StillReferenced(u32),
}

/// Unregistered device being populated by its driver.
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    name: Option<String>,
    description: String,
    device_type: DeviceType,
    pci: Option<PciLocation>,
    refcount: u32,
    parent: Option<DeviceHandle>,
    capability: Capability,
    private: Option<Box<dyn Any + Send + Sync>>,
    hooks: Option<Arc<dyn DeviceLifecycle>>,
}

impl DeviceBuilder {
    fn new() -> Self {
        Self {
            id: None,
            name: None,
            description: String::new(),
            device_type: DeviceType::Bridge,
            pci: None,
            refcount: 1,
            parent: None,
            capability: Capability::None,
            private: None,
            hooks: None,
        }
    }

    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// Explicit name; otherwise the registry assigns `<prefix><n>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit identity; otherwise a fresh one is assigned.
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn pci_location(mut self, location: PciLocation) -> Self {
        self.pci = Some(location);
        self
    }

    /// Initial reference count (defaults to 1).
    pub fn refcount(mut self, refcount: u32) -> Self {
        self.refcount = refcount;
        self
    }

    pub fn parent(mut self, parent: DeviceHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    /// Driver-private state, released after uninit.
    pub fn private<T: Any + Send + Sync>(mut self, state: T) -> Self {
        self.private = Some(Box::new(state));
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn DeviceLifecycle>) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

impl fmt::Debug for DeviceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuilder")
            .field("name", &self.name)
            .field("device_type", &self.device_type)
            .field("refcount", &self.refcount)
            .field("parent", &self.parent)
            .field("capability", &self.capability)
            .finish()
    }
}

struct DeviceRecord {
    seq: u64,
    id: DeviceId,
    name: String,
    description: String,
    device_type: DeviceType,
    pci: Option<PciLocation>,
    refcount: u32,
    parent: Option<DeviceHandle>,
    capability: Capability,
    private: Option<Box<dyn Any + Send + Sync>>,
    hooks: Option<Arc<dyn DeviceLifecycle>>,
}

impl DeviceRecord {
    fn info(&self, handle: DeviceHandle) -> DeviceInfo {
        DeviceInfo {
            handle,
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            device_type: self.device_type,
            pci: self.pci,
            refcount: self.refcount,
            parent: self.parent,
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    record: Option<DeviceRecord>,
}

/// The device table.
pub struct DeviceRegistry {
    config: RegistryConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    next_seq: u64,
    name_counters: HashMap<DeviceType, u32>,
    audit_log: RegistryAuditLog,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            next_seq: 0,
            name_counters: HashMap::new(),
            audit_log: RegistryAuditLog::new(),
        }
    }

    /// Starts a new, uninitialized device record.
    pub fn new_device(&self) -> DeviceBuilder {
        DeviceBuilder::new()
    }

    /// Inserts a root-level device and runs its init hook.
    pub fn register_device(&mut self, builder: DeviceBuilder) -> Result<DeviceHandle, DeviceError> {
        if builder.parent.is_some() {
            return Err(self.reject(&builder, DeviceError::UnexpectedParent));
        }
        self.insert(builder)
    }

    /// Inserts a device layered over `builder`'s parent and runs its init hook.
    ///
    /// The parent's count is left alone; the caller bumps it once this
    /// succeeds.
    pub fn attach_device(&mut self, builder: DeviceBuilder) -> Result<DeviceHandle, DeviceError> {
        match builder.parent {
            None => Err(self.reject(&builder, DeviceError::MissingParent)),
            Some(parent) if self.record(parent).is_none() => {
                Err(self.reject(&builder, DeviceError::ParentNotFound))
            }
            Some(_) => self.insert(builder),
        }
    }

    fn reject(&mut self, builder: &DeviceBuilder, error: DeviceError) -> DeviceError {
        let name = builder
            .name
            .clone()
            .unwrap_or_else(|| builder.device_type.name_prefix().to_string());
        services_logger::warn(LOG_TARGET, format!("Rejected {}: {}", name, error));
        self.audit_log.record(RegistryEvent::Rejected {
            name,
            reason: error.to_string(),
        });
        error
    }

    fn insert(&mut self, builder: DeviceBuilder) -> Result<DeviceHandle, DeviceError> {
        if self.live >= self.config.max_devices {
            return Err(self.reject(&builder, DeviceError::RegistryFull(self.config.max_devices)));
        }
        if !builder.capability.fits(builder.device_type) {
            let error = DeviceError::CapabilityMismatch {
                device_type: builder.device_type,
                capability: builder.capability.kind(),
            };
            return Err(self.reject(&builder, error));
        }
        if let Some(name) = &builder.name {
            if self.find_device(name).is_some() {
                return Err(self.reject(&builder, DeviceError::NameCollision(name.clone())));
            }
        }
        if let Some(id) = builder.id {
            if self.records().any(|(_, record)| record.id == id) {
                return Err(self.reject(&builder, DeviceError::IdCollision(id)));
            }
        }

        let name = match builder.name {
            Some(name) => name,
            None => self.next_name(builder.device_type),
        };
        let record = DeviceRecord {
            seq: self.next_seq,
            id: builder.id.unwrap_or_default(),
            name,
            description: builder.description,
            device_type: builder.device_type,
            pci: builder.pci,
            refcount: builder.refcount,
            parent: builder.parent,
            capability: builder.capability,
            private: builder.private,
            hooks: builder.hooks,
        };
        self.next_seq += 1;

        let hooks = record.hooks.clone();
        let handle = self.place(record);
        let info = self.device(handle).ok_or(DeviceError::NotFound)?;

        if let Some(hooks) = hooks {
            if let Err(error) = hooks.init(&info) {
                // Roll back: the driver's payloads drop with the record.
                drop(self.vacate(handle));
                let error = DeviceError::InitFailed {
                    name: info.name.clone(),
                    reason: error.to_string(),
                };
                services_logger::warn(LOG_TARGET, format!("Rejected {}: {}", info.name, error));
                self.audit_log.record(RegistryEvent::Rejected {
                    name: info.name,
                    reason: error.to_string(),
                });
                return Err(error);
            }
            self.audit_log.record(RegistryEvent::Initialized {
                name: info.name.clone(),
            });
        }

        match info.parent.and_then(|parent| self.record(parent)) {
            Some(parent) => {
                let parent_name = parent.name.clone();
                services_logger::info(
                    LOG_TARGET,
                    format!("Attached {} ({}) on {}", info.name, info.device_type, parent_name),
                );
                self.audit_log.record(RegistryEvent::Attached {
                    name: info.name,
                    parent: parent_name,
                });
            }
            None => {
                services_logger::info(
                    LOG_TARGET,
                    format!("Registered {} ({})", info.name, info.device_type),
                );
                self.audit_log.record(RegistryEvent::Registered {
                    name: info.name,
                    device_type: info.device_type,
                });
            }
        }
        Ok(handle)
    }

    fn next_name(&mut self, device_type: DeviceType) -> String {
        loop {
            let counter = self.name_counters.entry(device_type).or_insert(0);
            let candidate = format!("{}{}", device_type.name_prefix(), *counter);
            *counter += 1;
            if self.find_device(&candidate).is_none() {
                return candidate;
            }
        }
    }

    fn place(&mut self, record: DeviceRecord) -> DeviceHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return DeviceHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        DeviceHandle {
            index,
            generation: 0,
        }
    }

    fn vacate(&mut self, handle: DeviceHandle) -> Option<DeviceRecord> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(record)
    }

    fn record(&self, handle: DeviceHandle) -> Option<&DeviceRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    fn record_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceRecord> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    fn records(&self) -> impl Iterator<Item = (DeviceHandle, &DeviceRecord)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.record.as_ref().map(|record| {
                (
                    DeviceHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    record,
                )
            })
        })
    }

    /// Drops one reference to the device; at zero, removes it, runs uninit
    /// and releases the capability and private state.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub fn detach_device(&mut self, handle: DeviceHandle) -> Result<DetachOutcome, DeviceError> {
        let remaining = self.decrement_refcount(handle)?;
        let name = self
            .record(handle)
            .map(|record| record.name.clone())
            .ok_or(DeviceError::NotFound)?;
        self.audit_log.record(RegistryEvent::Detached {
            name: name.clone(),
            remaining,
        });
        if remaining > 0 {
            return Ok(DetachOutcome::StillReferenced(remaining));
        }

        let record = self.vacate(handle).ok_or(DeviceError::NotFound)?;
        let info = record.info(handle);
        if let Some(hooks) = &record.hooks {
            hooks.uninit(&info);
        }
        // Capability and private state are released here, exactly once.
        drop(record);
        services_logger::info(LOG_TARGET, format!("Released {} ({})", name, info.device_type));
        self.audit_log.record(RegistryEvent::Released { name });
        Ok(DetachOutcome::Removed)
    }

    /// Root-level counterpart of [`DeviceRegistry::detach_device`].
    pub fn unregister_device(&mut self, handle: DeviceHandle) -> Result<DetachOutcome, DeviceError> {
        self.detach_device(handle)
    }

    pub fn find_device(&self, name: &str) -> Option<DeviceHandle> {
        self.records()
            .find(|(_, record)| record.name == name)
            .map(|(handle, _)| handle)
    }

    pub fn find_device_by_id(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.records()
            .find(|(_, record)| record.id == id)
            .map(|(handle, _)| handle)
    }

    /// All devices of `device_type`, in registration order.
    pub fn find_devices_by_type(&self, device_type: DeviceType) -> Vec<DeviceHandle> {
        self.ordered()
            .into_iter()
            .filter(|(_, record)| record.device_type == device_type)
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Adds a reference and returns the new count.
    pub fn increment_refcount(&mut self, handle: DeviceHandle) -> Result<u32, DeviceError> {
        let record = self.record_mut(handle).ok_or(DeviceError::NotFound)?;
        record.refcount += 1;
        Ok(record.refcount)
    }

    /// Drops a reference and returns the new count. Never removes the device.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub fn decrement_refcount(&mut self, handle: DeviceHandle) -> Result<u32, DeviceError> {
        let record = self.record_mut(handle).ok_or(DeviceError::NotFound)?;
        if record.refcount == 0 {
            panic!("refcount underflow on device {}", record.name);
        }
        record.refcount -= 1;
        Ok(record.refcount)
    }

    pub fn refcount(&self, handle: DeviceHandle) -> Option<u32> {
        self.record(handle).map(|record| record.refcount)
    }

    pub fn contains(&self, handle: DeviceHandle) -> bool {
        self.record(handle).is_some()
    }

    pub fn device(&self, handle: DeviceHandle) -> Option<DeviceInfo> {
        self.record(handle).map(|record| record.info(handle))
    }

    pub fn name(&self, handle: DeviceHandle) -> Option<&str> {
        self.record(handle).map(|record| record.name.as_str())
    }

    pub fn device_type(&self, handle: DeviceHandle) -> Option<DeviceType> {
        self.record(handle).map(|record| record.device_type)
    }

    pub fn parent(&self, handle: DeviceHandle) -> Option<DeviceHandle> {
        self.record(handle).and_then(|record| record.parent)
    }

    pub fn capability(&self, handle: DeviceHandle) -> Option<Capability> {
        self.record(handle).map(|record| record.capability.clone())
    }

    /// Driver-private state, if it has type `T`.
    pub fn private_state<T: Any>(&self, handle: DeviceHandle) -> Option<&T> {
        self.record(handle)
            .and_then(|record| record.private.as_deref())
            .and_then(|state| state.downcast_ref::<T>())
    }

    /// Block shape of a disk, virtual block device or partition.
    pub fn block(&self, handle: DeviceHandle) -> Option<Arc<dyn BlockCapability>> {
        self.record(handle)
            .and_then(|record| record.capability.as_block())
    }

    pub fn serial(&self, handle: DeviceHandle) -> Option<Arc<dyn SerialCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Serial(serial)) => Some(Arc::clone(serial)),
            _ => None,
        }
    }

    pub fn console(&self, handle: DeviceHandle) -> Option<Arc<dyn ConsoleCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Console(console)) => Some(Arc::clone(console)),
            _ => None,
        }
    }

    pub fn filesystem(&self, handle: DeviceHandle) -> Option<Arc<dyn FilesystemCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Filesystem(fs)) => Some(Arc::clone(fs)),
            _ => None,
        }
    }

    pub fn partition(&self, handle: DeviceHandle) -> Option<Arc<dyn PartitionCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Partition { partition, .. }) => Some(Arc::clone(partition)),
            _ => None,
        }
    }

    pub fn partition_table(
        &self,
        handle: DeviceHandle,
    ) -> Option<Arc<dyn PartitionTableCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::PartitionTable(table)) => Some(Arc::clone(table)),
            _ => None,
        }
    }

    pub fn rtc(&self, handle: DeviceHandle) -> Option<Arc<dyn RtcCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Rtc(rtc)) => Some(Arc::clone(rtc)),
            _ => None,
        }
    }

    pub fn speaker(&self, handle: DeviceHandle) -> Option<Arc<dyn SpeakerCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Speaker(speaker)) => Some(Arc::clone(speaker)),
            _ => None,
        }
    }

    pub fn pit(&self, handle: DeviceHandle) -> Option<Arc<dyn PitCapability>> {
        match self.record(handle).map(|record| &record.capability) {
            Some(Capability::Pit(pit)) => Some(Arc::clone(pit)),
            _ => None,
        }
    }

    /// Devices whose parent is `handle`, in registration order.
    pub fn children_of(&self, handle: DeviceHandle) -> Vec<DeviceHandle> {
        self.ordered()
            .into_iter()
            .filter(|(_, record)| record.parent == Some(handle))
            .map(|(handle, _)| handle)
            .collect()
    }

    fn ordered(&self) -> Vec<(DeviceHandle, &DeviceRecord)> {
        let mut records: Vec<_> = self.records().collect();
        records.sort_by_key(|(_, record)| record.seq);
        records
    }

    /// Snapshot of every device, in registration order.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.ordered()
            .into_iter()
            .map(|(handle, record)| record.info(handle))
            .collect()
    }

    pub fn device_count(&self) -> usize {
        self.live
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &RegistryAuditLog {
        &self.audit_log
    }

    pub fn audit_log_mut(&mut self) -> &mut RegistryAuditLog {
        &mut self.audit_log
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.devices()).finish()
    }
}
