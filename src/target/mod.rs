//! Benchmark targets
//!
//! A target is the single block device or plain file a run operates on. It is
//! opened once by the [`resolver`], then shared read-only (behind an `Arc`) by every
//! worker. All IO goes through positioned syscalls on the one descriptor, so the
//! handle needs no interior mutability.
//!
//! # Target Types
//!
//! - **Block Device**: raw devices (e.g. /dev/sdb, /dev/nvme0n1); capacity and
//!   logical block size come from the kernel
//! - **File**: a plain file created by magicsmoke itself; existing files are never
//!   touched
//!
//! # Example
//!
//! ```no_run
//! use magicsmoke::target::AccessMode;
//! use magicsmoke::target::resolver::{resolve, ResolveOptions};
//! use std::path::Path;
//!
//! let options = ResolveOptions { access: AccessMode::ReadWrite, ..Default::default() };
//! let target = resolve(Path::new("/dev/sdb"), &options)?;
//! println!("{} bytes, alignment {}", target.capacity(), target.alignment());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod block;
pub mod resolver;

use crate::error::TargetError;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Fallback alignment for plain files opened with O_DIRECT
///
/// Used when the filesystem reports no usable block size. Buffered plain files
/// need no alignment.
pub const DIRECT_FILE_ALIGNMENT: u64 = 512;

/// O_DIRECT alignment for a plain file with the given `st_blksize`
///
/// The filesystem block size is taken when it is a power of two of at least
/// 512 bytes, so 4Kn-backed filesystems get 4096; anything else falls back to
/// [`DIRECT_FILE_ALIGNMENT`].
pub fn direct_file_alignment(blksize: u64) -> u64 {
    if blksize >= DIRECT_FILE_ALIGNMENT && blksize.is_power_of_two() {
        blksize
    } else {
        DIRECT_FILE_ALIGNMENT
    }
}

/// Permissions a target is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Map the read/write switches to an access mode
    ///
    /// Returns `None` when neither is selected.
    pub fn from_flags(read: bool, write: bool) -> Option<Self> {
        match (read, write) {
            (true, true) => Some(AccessMode::ReadWrite),
            (true, false) => Some(AccessMode::Read),
            (false, true) => Some(AccessMode::Write),
            (false, false) => None,
        }
    }

    pub fn allows_read(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn allows_write(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }

    fn apply(self, options: &mut OpenOptions) {
        options.read(self.allows_read()).write(self.allows_write());
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
            AccessMode::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// What kind of object the target path refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    BlockDevice,
    File,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::BlockDevice => write!(f, "block device"),
            TargetKind::File => write!(f, "file"),
        }
    }
}

/// Immutable facts about a resolved target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetDescriptor {
    pub path: PathBuf,
    pub kind: TargetKind,

    /// Addressable size in bytes, fixed for the run
    pub capacity: u64,

    pub access: AccessMode,

    /// Offset/buffer alignment in bytes (logical block size for devices)
    pub alignment: u64,

    /// Opened with O_DIRECT
    pub direct: bool,
}

/// An opened target
///
/// Owns the descriptor; it is closed when the handle is dropped.
#[derive(Debug)]
pub struct TargetHandle {
    file: File,
    descriptor: TargetDescriptor,
}

impl TargetHandle {
    pub(crate) fn new(file: File, descriptor: TargetDescriptor) -> Self {
        Self { file, descriptor }
    }

    /// Open an existing plain file without the block-device checks
    ///
    /// Used after the resolver has created a fresh file, and by tests.
    pub(crate) fn open_regular_file(path: &Path, access: AccessMode) -> Result<Self, TargetError> {
        open_file(path, access, false)
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.descriptor.path
    }

    pub fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    pub fn capacity(&self) -> u64 {
        self.descriptor.capacity
    }

    pub fn alignment(&self) -> u64 {
        self.descriptor.alignment
    }

    pub fn access(&self) -> AccessMode {
        self.descriptor.access
    }
}

/// Open a plain file and size it from its metadata
pub(crate) fn open_file(path: &Path, access: AccessMode, direct: bool) -> Result<TargetHandle, TargetError> {
    let file = open_options(access, direct)
        .open(path)
        .map_err(|source| classify_io(path, "open", source))?;

    let metadata = file
        .metadata()
        .map_err(|source| classify_io(path, "stat", source))?;
    let capacity = metadata.len();
    if capacity == 0 {
        return Err(TargetError::ZeroCapacity { path: path.to_path_buf() });
    }

    let alignment = if direct { direct_file_alignment(metadata.blksize()) } else { 1 };
    Ok(TargetHandle::new(
        file,
        TargetDescriptor {
            path: path.to_path_buf(),
            kind: TargetKind::File,
            capacity,
            access,
            alignment,
            direct,
        },
    ))
}

pub(crate) fn open_options(access: AccessMode, direct: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    access.apply(&mut options);
    if direct {
        options.custom_flags(libc::O_DIRECT);
    }
    options
}

/// Turn an OS error into the matching target error
pub(crate) fn classify_io(path: &Path, action: &'static str, source: io::Error) -> TargetError {
    let path = path.to_path_buf();
    match source.kind() {
        io::ErrorKind::PermissionDenied => TargetError::AccessDenied { path, source },
        io::ErrorKind::NotFound => TargetError::NotFound { path },
        io::ErrorKind::AlreadyExists => TargetError::AlreadyExists { path },
        _ => TargetError::Io { path, action, source },
    }
}

#[cfg(target_os = "linux")]
const TARGET_LOST_ERRNOS: &[i32] = &[libc::ENODEV, libc::ENXIO, libc::EBADF, libc::ENOMEDIUM];

#[cfg(not(target_os = "linux"))]
const TARGET_LOST_ERRNOS: &[i32] = &[libc::ENODEV, libc::ENXIO, libc::EBADF];

/// Whether an IO error means the target itself is gone
///
/// Device removal, a dead descriptor or missing media make every following
/// operation fail too, so the run aborts instead of counting failures.
pub fn is_target_lost(err: &io::Error) -> bool {
    err.raw_os_error()
        .map(|errno| TARGET_LOST_ERRNOS.contains(&errno))
        .unwrap_or(false)
}
