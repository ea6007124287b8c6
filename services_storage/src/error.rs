use hal::BlockError;
use services_device_manager::DeviceError;
use thiserror::Error;

/// Storage-stack failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("Block I/O failed: {0}")]
    Io(#[from] BlockError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("{0} is not a block device")]
    NotBlockDevice(String),

    #[error("{0} is not a partition table")]
    NotPartitionTable(String),

    #[error("{0} is not a partition")]
    NotPartition(String),

    #[error("{0} is not a filesystem")]
    NotFilesystem(String),

    #[error("Partition table entry {0} is empty")]
    EmptyPartition(u32),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory full")]
    DirectoryFull,

    #[error("No space left for {0} bytes")]
    NoSpace(u64),

    #[error("Volume too small: {0} sectors")]
    VolumeTooSmall(u32),

    #[error("Invalid boot sector: {0}")]
    InvalidBootSector(&'static str),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

impl From<FsError> for DeviceError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::Io(err) => DeviceError::Io(err),
            FsError::Device(err) => err,
            FsError::NotImplemented(what) => DeviceError::NotImplemented(what),
            other => DeviceError::Filesystem(other.to_string()),
        }
    }
}
