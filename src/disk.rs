//! Free-space probing for the backup precondition check.

use std::{
    io,
    path::{Path, PathBuf},
};

use sysinfo::Disks;

/// Source of "bytes available at this path".
pub trait DiskSpace {
    fn available_space(&self, path: &Path) -> io::Result<u64>;
}

/// [`DiskSpace`] backed by the OS disk list.
///
/// The disk whose mount point is the longest prefix of the (canonicalised)
/// path wins, so `/home` beats `/` for `/home/alice/export`.
#[derive(Debug, Default)]
pub struct SystemDisks;

impl DiskSpace for SystemDisks {
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        let path = path.canonicalize()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(sysinfo::Disk::available_space)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no mounted disk contains {}", path.display()),
                )
            })
    }
}

/// Everything needed to decide whether a backup may start without asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPrecondition {
    pub target: PathBuf,
    pub expected: u64,
    pub available: u64,
}

impl BackupPrecondition {
    /// The user has to confirm iff the export is expected to need more
    /// space than is free.
    pub const fn needs_confirmation(&self) -> bool {
        self.expected > self.available
    }
}
