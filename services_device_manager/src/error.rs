use core_types::{DeviceId, DeviceType};
use hal::BlockError;
use thiserror::Error;

/// Signaled failures of registry and capability operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device name already registered: {0}")]
    NameCollision(String),

    #[error("Device identity already registered: {0}")]
    IdCollision(DeviceId),

    #[error("Device not found")]
    NotFound,

    #[error("Parent device not found")]
    ParentNotFound,

    #[error("Attach requires a parent device")]
    MissingParent,

    #[error("Root-level registration cannot carry a parent device")]
    UnexpectedParent,

    #[error("Capability {capability} does not fit devicetype {device_type}")]
    CapabilityMismatch {
        device_type: DeviceType,
        capability: &'static str,
    },

    #[error("Registry full ({0} devices)")]
    RegistryFull(usize),

    #[error("Init of {name} failed: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Block I/O failed: {0}")]
    Io(#[from] BlockError),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Filesystem error: {0}")]
    Filesystem(String),
}
