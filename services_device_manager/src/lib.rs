//! # Device Manager
//!
//! Every hardware and logical device in the kernel is a record in one
//! [`DeviceRegistry`]: an identity, a unique name, a devicetype tag, a
//! reference count, and a typed [`Capability`] that callers dispatch
//! through.
//!
//! ## Lifecycle
//!
//! A driver takes a [`DeviceBuilder`] from [`DeviceRegistry::new_device`],
//! fills in type, capability, private state and hooks, then either
//! registers it (root level) or attaches it over a parent. Detach drops one
//! reference; the record and its payloads are released only when the count
//! reaches zero. Parent counts are the layering driver's business.

pub mod audit;
pub mod capability;
pub mod config;
pub mod error;
pub mod registry;

pub use audit::{RegistryAuditLog, RegistryEvent};
pub use capability::{
    BlockCapability, Capability, ConsoleCapability, DirEntry, DirectoryListing,
    FilesystemCapability, PartitionCapability, PartitionTableCapability, PartitionType,
    PitCapability, RtcCallback, RtcCapability, RtcTime, SerialCapability, SpeakerCapability,
};
pub use config::RegistryConfig;
pub use error::DeviceError;
pub use registry::{
    DetachOutcome, DeviceBuilder, DeviceHandle, DeviceInfo, DeviceLifecycle, DeviceRegistry,
};
