use thiserror::Error;

/// Failures raised while laying out the image.
///
/// Everything here is fatal except where the caller chooses to skip an entry
/// (see `InvalidName`, which the host scanner downgrades to a warning).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("write of {len} bytes at offset {offset:#x} exceeds image size {capacity:#x}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("value {value:#x} does not fit in {width}-byte field {field}")]
    FieldOverflow {
        field: &'static str,
        width: usize,
        value: u64,
    },

    #[error("invalid disk geometry: {0}")]
    Geometry(String),

    #[error("boot sector is {len} bytes, at most {max} allowed")]
    BootSectorTooLarge { len: usize, max: usize },

    #[error("bootloader is {len} bytes, at most {max} fit before the partition")]
    BootloaderTooLarge { len: usize, max: usize },

    #[error("name {name:?} is not a valid short name (1 to 11 bytes)")]
    InvalidName { name: String },

    #[error("directory {path:?} is full ({capacity} entries)")]
    DirectoryFull { path: String, capacity: usize },

    #[error("file {path:?} is {len} bytes, larger than a FAT file can be")]
    FileTooLarge { path: String, len: u64 },

    #[error("failed to read {path:?}: {message}")]
    ReadFailed { path: String, message: String },

    #[error("volume full: {clusters} clusters requested at cluster {next}, last usable is {max}")]
    VolumeFull { clusters: usize, next: u32, max: u32 },
}
