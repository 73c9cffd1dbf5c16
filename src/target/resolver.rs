//! Target resolution
//!
//! Turns the user-supplied path into an opened [`TargetHandle`]:
//!
//! - an existing block device is opened with the requested access mode and
//!   sized via ioctl
//! - an existing path of any other type is refused; magicsmoke never overwrites
//!   a file it did not create
//! - a missing path becomes a new plain file of the requested size
//!
//! All failures are classified as [`TargetError`] so the binary can map them to
//! a dedicated exit status.

use super::{block, classify_io, open_file, open_options, AccessMode, TargetDescriptor, TargetHandle, TargetKind};
use crate::error::TargetError;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How large a newly created file should be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateSize {
    /// Multiples of the parent filesystem's block size
    Blocks(u64),

    /// Exact size in bytes
    Bytes(u64),
}

impl Default for CreateSize {
    fn default() -> Self {
        CreateSize::Blocks(10)
    }
}

/// Options controlling how a target is opened or created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub access: AccessMode,

    /// Size for a newly created file (ignored for block devices)
    pub create_size: CreateSize,

    /// Allocate the new file's blocks up front with posix_fallocate
    pub preallocate: bool,

    /// Open with O_DIRECT
    pub direct: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            access: AccessMode::Read,
            create_size: CreateSize::default(),
            preallocate: false,
            direct: false,
        }
    }
}

/// Resolve a path to an opened target
pub fn resolve(path: &Path, options: &ResolveOptions) -> Result<TargetHandle, TargetError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.file_type().is_block_device() => open_block_device(path, options),
        Ok(_) => Err(TargetError::NotBlockDevice { path: path.to_path_buf() }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => create_file(path, options),
        Err(err) => Err(classify_io(path, "inspect", err)),
    }
}

fn open_block_device(path: &Path, options: &ResolveOptions) -> Result<TargetHandle, TargetError> {
    let file = open_options(options.access, options.direct)
        .open(path)
        .map_err(|source| classify_io(path, "open", source))?;

    let capacity = block::device_size(&file).map_err(|source| TargetError::Io {
        path: path.to_path_buf(),
        action: "query the size of",
        source,
    })?;
    if capacity == 0 {
        return Err(TargetError::ZeroCapacity { path: path.to_path_buf() });
    }

    let alignment = block::logical_block_size(&file).map_err(|source| TargetError::Io {
        path: path.to_path_buf(),
        action: "query the logical block size of",
        source,
    })?;

    debug!(path = %path.display(), capacity, alignment, "Opened block device");

    Ok(TargetHandle::new(
        file,
        TargetDescriptor {
            path: path.to_path_buf(),
            kind: TargetKind::BlockDevice,
            capacity,
            access: options.access,
            alignment,
            direct: options.direct,
        },
    ))
}

/// Directory a new file will be created in
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Byte size of a new file at `path`
fn creation_size(path: &Path, size: CreateSize) -> Result<u64, TargetError> {
    match size {
        CreateSize::Bytes(bytes) => Ok(bytes),
        CreateSize::Blocks(blocks) => {
            let parent = parent_dir(path);
            let metadata = std::fs::metadata(&parent).map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => TargetError::NotFound { path: path.to_path_buf() },
                _ => classify_io(&parent, "inspect", source),
            })?;
            Ok(blocks.saturating_mul(metadata.blksize()))
        }
    }
}

fn create_file(path: &Path, options: &ResolveOptions) -> Result<TargetHandle, TargetError> {
    let size = creation_size(path, options.create_size)?;
    if size == 0 {
        return Err(TargetError::ZeroCapacity { path: path.to_path_buf() });
    }

    // create_new turns a concurrent creation into AlreadyExists instead of
    // silently sharing someone else's file
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| classify_io(path, "create", source))?;

    // From here on a failure removes the file again
    let sized = size_new_file(&file, path, size, options.preallocate);
    drop(file);
    if let Err(err) = sized {
        remove_created(path);
        return Err(err);
    }

    info!(path = %path.display(), size, preallocated = options.preallocate, "Created target file");

    open_file(path, options.access, options.direct).map_err(|err| {
        remove_created(path);
        err
    })
}

fn size_new_file(file: &File, path: &Path, size: u64, preallocate: bool) -> Result<(), TargetError> {
    if preallocate {
        let len = libc::off_t::try_from(size).map_err(|_| TargetError::Io {
            path: path.to_path_buf(),
            action: "preallocate",
            source: io::Error::from_raw_os_error(libc::EFBIG),
        })?;
        // SAFETY: plain syscall on a descriptor we own
        let ret = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len) };
        if ret != 0 {
            return Err(TargetError::Io {
                path: path.to_path_buf(),
                action: "preallocate",
                source: io::Error::from_raw_os_error(ret),
            });
        }
        Ok(())
    } else {
        file.set_len(size).map_err(|source| TargetError::Io {
            path: path.to_path_buf(),
            action: "size",
            source,
        })
    }
}

fn remove_created(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed partially created target file"),
        Err(err) => warn!(path = %path.display(), error = %err, "Failed to remove partially created target file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_existing_regular_file_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("precious.txt");
        std::fs::write(&path, b"do not touch").unwrap();

        let err = resolve(&path, &ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, TargetError::NotBlockDevice { .. }));
        assert!(err.to_string().contains("refusing to overwrite"));

        // Contents untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"do not touch");
    }

    #[test]
    fn test_character_device_is_refused() {
        let err = resolve(Path::new("/dev/null"), &ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, TargetError::NotBlockDevice { .. }));
    }

    #[test]
    fn test_creates_file_with_raw_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("new.dat");

        let options = ResolveOptions {
            access: AccessMode::ReadWrite,
            create_size: CreateSize::Bytes(1024),
            ..Default::default()
        };
        let target = resolve(&path, &options).unwrap();

        assert_eq!(target.capacity(), 1024);
        assert_eq!(target.descriptor().kind, TargetKind::File);
        assert_eq!(target.access(), AccessMode::ReadWrite);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
    }

    #[test]
    fn test_creates_file_from_block_count() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blocks.dat");
        let blksize = std::fs::metadata(temp_dir.path()).unwrap().blksize();

        let options = ResolveOptions { create_size: CreateSize::Blocks(3), ..Default::default() };
        let target = resolve(&path, &options).unwrap();

        assert_eq!(target.capacity(), 3 * blksize);
    }

    #[test]
    fn test_preallocated_file_has_requested_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prealloc.dat");

        let options = ResolveOptions {
            access: AccessMode::Write,
            create_size: CreateSize::Bytes(64 * 1024),
            preallocate: true,
            ..Default::default()
        };
        let target = resolve(&path, &options).unwrap();
        assert_eq!(target.capacity(), 64 * 1024);
    }

    #[test]
    fn test_missing_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("new.dat");

        let err = resolve(&path, &ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, TargetError::NotFound { .. }));

        let options = ResolveOptions { create_size: CreateSize::Bytes(512), ..Default::default() };
        let err = resolve(&path, &options).unwrap_err();
        assert!(matches!(err, TargetError::NotFound { .. }));
    }

    #[test]
    fn test_zero_create_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("zero.dat");

        let options = ResolveOptions { create_size: CreateSize::Bytes(0), ..Default::default() };
        let err = resolve(&path, &options).unwrap_err();
        assert!(matches!(err, TargetError::ZeroCapacity { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_second_resolve_refuses_created_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("once.dat");

        let options = ResolveOptions { create_size: CreateSize::Bytes(4096), ..Default::default() };
        resolve(&path, &options).unwrap();

        let err = resolve(&path, &options).unwrap_err();
        assert!(matches!(err, TargetError::NotBlockDevice { .. }));
    }

    #[test]
    fn test_failed_sizing_removes_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("huge.dat");

        let options = ResolveOptions { create_size: CreateSize::Bytes(u64::MAX), ..Default::default() };
        let err = resolve(&path, &options).unwrap_err();
        assert!(matches!(err, TargetError::Io { action: "size", .. }));
        assert!(!path.exists());

        // A retry with a sane size is not refused as an existing file
        let options = ResolveOptions { create_size: CreateSize::Bytes(4096), ..Default::default() };
        assert_eq!(resolve(&path, &options).unwrap().capacity(), 4096);
    }

    #[test]
    fn test_failed_preallocation_removes_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("huge-prealloc.dat");

        let options = ResolveOptions {
            create_size: CreateSize::Bytes(u64::MAX),
            preallocate: true,
            ..Default::default()
        };
        let err = resolve(&path, &options).unwrap_err();
        assert!(matches!(err, TargetError::Io { action: "preallocate", .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_parent_dir_of_bare_name() {
        assert_eq!(parent_dir(Path::new("disk.img")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/tmp/disk.img")), PathBuf::from("/tmp"));
    }
}
