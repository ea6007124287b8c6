//! # Storage Service
//!
//! The block storage stack that sits on top of the device registry.
//!
//! ## Layers
//!
//! ```text
//! filesystem (fat | cfs | initrd)
//!     partition
//!         partition table (gpt | mbr)
//!             disk / vblock
//! ```
//!
//! Every layer is a device of its own, attached over the one below it and
//! holding one reference on it. Detaching a layer gives that reference
//! back, so a disk cannot be torn down while a table, partition or
//! filesystem still sits on it.
//!
//! - **block_util**: byte-offset and short-buffer I/O over a Block capability
//! - **partition_table**: table discovery, GPT first then MBR
//! - **partition**: offset, bounds-checked block windows onto a disk
//! - **fs**: the three filesystem formats and format probing

pub mod block_util;
pub mod error;
pub mod failing_device;
pub mod fs;
pub mod layer;
pub mod partition;
pub mod partition_table;
pub mod shared_device;

#[cfg(test)]
mod test_support;

pub use error::FsError;
pub use failing_device::{FailingBlockDevice, FailurePolicy};
pub use fs::{attach_filesystem, detach_filesystem, filesystem_of, Cfs, Fat, Initrd};
pub use layer::{attach_layer, attach_layer_with_hooks, detach_layer, LayerHooks};
pub use partition::{
    attach_partition, attach_partitions, detach_partition, detach_partitions, partition_index,
    PartitionBlock,
};
pub use partition_table::{
    attach_partition_table, detach_partition_table, ParsedTable, PartitionEntry,
};
pub use shared_device::SharedBlockDevice;
