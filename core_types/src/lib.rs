//! # Core Types
//!
//! This crate defines the fundamental types shared by the device manager,
//! the bus enumerators and the storage stack.
//!
//! ## Key Types
//!
//! - [`DeviceId`]: Process-unique identity assigned at registration
//! - [`DeviceType`]: Closed devicetype tag that fixes a device's capability shape
//! - [`PciLocation`]: Bus/device/function record for bus-discovered devices

pub mod device_type;
pub mod ids;
pub mod location;

pub use device_type::DeviceType;
pub use ids::DeviceId;
pub use location::PciLocation;
