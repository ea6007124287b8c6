//! # Failing Block Device
//!
//! A BlockDevice wrapper that can simulate failures for testing error paths
//! of the partition and filesystem layers without faulty hardware.

use std::collections::BTreeMap;

use hal::{BlockDevice, BlockError};

/// Policy for when failures should occur
#[derive(Debug, Clone)]
pub enum FailurePolicy {
    /// Never fail (passthrough)
    Never,
    /// Fail every write after N successful ones
    AfterWrites(usize),
    /// Fail any transfer touching one of these sectors
    OnSectors(Vec<u64>),
    /// Fail reads only, from the first one on
    Reads,
    /// Fail after N writes to specific sectors
    AfterWritesToSectors { count: usize, sectors: Vec<u64> },
}

/// Wrapper around a BlockDevice that can simulate failures
pub struct FailingBlockDevice<D: BlockDevice> {
    inner: D,
    policy: FailurePolicy,
    write_count: usize,
    sector_write_counts: BTreeMap<u64, usize>,
}

impl<D: BlockDevice> FailingBlockDevice<D> {
    /// Create a new failing block device with the given policy
    pub fn new(inner: D, policy: FailurePolicy) -> Self {
        Self {
            inner,
            policy,
            write_count: 0,
            sector_write_counts: BTreeMap::new(),
        }
    }

    fn touches(lba: u64, count: u32, sectors: &[u64]) -> bool {
        sectors
            .iter()
            .any(|&sector| sector >= lba && sector < lba + count as u64)
    }

    fn should_fail_write(&mut self, lba: u64, count: u32) -> bool {
        match &self.policy {
            FailurePolicy::Never | FailurePolicy::Reads => false,
            FailurePolicy::AfterWrites(n) => self.write_count >= *n,
            FailurePolicy::OnSectors(sectors) => Self::touches(lba, count, sectors),
            FailurePolicy::AfterWritesToSectors { count: limit, sectors } => sectors
                .iter()
                .filter(|&&sector| sector >= lba && sector < lba + count as u64)
                .any(|sector| self.sector_write_counts.get(sector).copied().unwrap_or(0) >= *limit),
        }
    }

    /// Get the underlying device (for inspection)
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Get mutable access to the underlying device
    pub fn inner_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    /// Get the number of writes that have occurred
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Reset the failure policy
    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
        self.write_count = 0;
        self.sector_write_counts.clear();
    }
}

impl<D: BlockDevice> BlockDevice for FailingBlockDevice<D> {
    fn sector_count(&self) -> u64 {
        self.inner.sector_count()
    }

    fn sector_size(&self) -> usize {
        self.inner.sector_size()
    }

    fn read_sectors(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), BlockError> {
        match &self.policy {
            FailurePolicy::Reads => return Err(BlockError::IoError),
            FailurePolicy::OnSectors(sectors) if Self::touches(lba, count, sectors) => {
                return Err(BlockError::IoError)
            }
            _ => {}
        }
        self.inner.read_sectors(lba, count, buffer)
    }

    fn write_sectors(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), BlockError> {
        if self.should_fail_write(lba, count) {
            return Err(BlockError::IoError);
        }

        self.write_count += 1;
        if let FailurePolicy::AfterWritesToSectors { sectors, .. } = &self.policy {
            for &sector in sectors {
                if sector >= lba && sector < lba + count as u64 {
                    *self.sector_write_counts.entry(sector).or_insert(0) += 1;
                }
            }
        }

        self.inner.write_sectors(lba, count, buffer)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        // Flush failures can also be simulated
        if matches!(self.policy, FailurePolicy::AfterWrites(n) if self.write_count >= n) {
            return Err(BlockError::IoError);
        }
        self.inner.flush()
    }
}
