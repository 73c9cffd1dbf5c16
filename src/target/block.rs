//! Block device geometry
//!
//! Capacity and logical block size of an opened block device, queried with the
//! BLKGETSIZE64 and BLKSSZGET ioctls on Linux. Other Unix systems fall back to
//! seeking to the end of the device and assuming 512-byte sectors.

use std::fs::File;
use std::io;

/// Sector size assumed when the kernel cannot report one
pub const DEFAULT_LOGICAL_BLOCK_SIZE: u64 = 512;

#[cfg(target_os = "linux")]
mod ioctl {
    // ioctl request codes from <linux/fs.h>
    pub const BLKGETSIZE64: libc::c_ulong = 0x80081272;
    pub const BLKSSZGET: libc::c_ulong = 0x1268;
}

/// Size of the device in bytes
#[cfg(target_os = "linux")]
pub fn device_size(file: &File) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let mut size: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer
    let result = unsafe { libc::ioctl(file.as_raw_fd(), ioctl::BLKGETSIZE64 as _, &mut size) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size)
}

#[cfg(not(target_os = "linux"))]
pub fn device_size(file: &File) -> io::Result<u64> {
    use std::io::{Seek, SeekFrom};

    let mut handle = file;
    let size = handle.seek(SeekFrom::End(0))?;
    handle.seek(SeekFrom::Start(0))?;
    Ok(size)
}

/// Logical block size of the device in bytes
///
/// This is the minimum alignment for O_DIRECT offsets and buffers.
#[cfg(target_os = "linux")]
pub fn logical_block_size(file: &File) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    let mut size: libc::c_int = 0;
    // SAFETY: BLKSSZGET writes a single int through the pointer
    let result = unsafe { libc::ioctl(file.as_raw_fd(), ioctl::BLKSSZGET as _, &mut size) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    if size <= 0 {
        return Ok(DEFAULT_LOGICAL_BLOCK_SIZE);
    }
    Ok(size as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn logical_block_size(_file: &File) -> io::Result<u64> {
    Ok(DEFAULT_LOGICAL_BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    // Real block devices need root; these only check that the ioctls fail
    // cleanly on something that is not a device.

    #[test]
    #[cfg(target_os = "linux")]
    fn test_ioctls_reject_regular_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(device_size(file.as_file()).is_err());
        assert!(logical_block_size(file.as_file()).is_err());
    }

    #[test]
    #[ignore] // Requires root and a block device
    fn test_device_geometry_real_device() {
        let file = File::open("/dev/sdb").unwrap();
        assert!(device_size(&file).unwrap() > 0);
        let sector = logical_block_size(&file).unwrap();
        assert!(sector.is_power_of_two());
    }
}
