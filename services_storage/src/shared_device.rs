//! Block capability over an owned `hal::BlockDevice`.

use std::sync::{Mutex, PoisonError};

use hal::{BlockDevice, BlockError};
use services_device_manager::BlockCapability;

/// Wraps a sector device so it can be shared as a Block capability.
pub struct SharedBlockDevice<D: BlockDevice + Send> {
    inner: Mutex<D>,
}

impl<D: BlockDevice + Send> SharedBlockDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            inner: Mutex::new(device),
        }
    }

    /// Runs `f` with exclusive access to the wrapped device.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut device = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut device)
    }

    pub fn into_inner(self) -> D {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: BlockDevice + Send> BlockCapability for SharedBlockDevice<D> {
    fn read(&self, lba: u64, buf: &mut [u8], count: u32) -> Result<(), BlockError> {
        self.with_device(|device| device.read_sectors(lba, count, buf))
    }

    fn write(&self, lba: u64, buf: &[u8], count: u32) -> Result<(), BlockError> {
        self.with_device(|device| device.write_sectors(lba, count, buf))
    }

    fn sector_size(&self) -> u16 {
        self.with_device(|device| device.sector_size().min(u16::MAX as usize) as u16)
    }

    fn total_sectors(&self) -> u32 {
        self.with_device(|device| device.sector_count().min(u32::MAX as u64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;

    #[test]
    fn test_shared_device_delegates() {
        let shared = SharedBlockDevice::new(RamDisk::new(8));
        assert_eq!(shared.sector_size(), 512);
        assert_eq!(shared.total_sectors(), 8);

        let data = [0xA5u8; 512];
        shared.write(3, &data, 1).unwrap();
        let mut out = [0u8; 512];
        shared.read(3, &mut out, 1).unwrap();
        assert_eq!(out, data);

        assert_eq!(shared.read(8, &mut out, 1), Err(BlockError::OutOfBounds));
        assert_eq!(shared.with_device(|disk| disk.as_bytes()[3 * 512]), 0xA5);
    }
}
