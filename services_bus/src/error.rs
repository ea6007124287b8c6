use core_types::PciLocation;
use thiserror::Error;

/// Bus enumeration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Invalid PCI location {0}")]
    InvalidLocation(PciLocation),

    #[error("No ISA device named {0}")]
    UnknownIsaDevice(String),
}
