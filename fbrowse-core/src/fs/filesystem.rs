//! ``src/fs/filesystem.rs``
//! ============================================================================
//! # `FileSystem`: Access Layer Used by the Workers
//!
//! The directory and search workers never touch `std::fs` directly; they go
//! through this trait so tests can inject conditions a temp dir cannot
//! reproduce (permission denial while running as root, failing reads).

use std::ffi::OsString;
use std::fs::{self, DirEntry};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use compact_str::CompactString;

use crate::fs::entry_info::EntryInfo;

/// Name-level view of one directory entry, as enumeration yields it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    /// Name as stored on disk. Paths are built from this one.
    pub file_name: OsString,
    /// Lossy UTF-8 rendering for matching and display.
    pub name: CompactString,
    /// Directory, following symlinks.
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl DirItem {
    #[must_use]
    pub fn new(file_name: OsString, is_dir: bool, is_symlink: bool) -> Self {
        let name = CompactString::new(file_name.to_string_lossy());
        Self {
            file_name,
            name,
            is_dir,
            is_symlink,
        }
    }

    /// Path of this entry inside `dir`.
    #[inline]
    #[must_use]
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    #[inline]
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

pub trait FileSystem: Send + Sync {
    /// True if `path` resolves to an existing directory.
    fn dir_exists(&self, path: &Path) -> bool;

    fn is_readable(&self, dir: &Path) -> bool;

    /// True if `path` itself is a symbolic link (not followed).
    fn is_symlink(&self, path: &Path) -> bool;

    /// Enumerate `dir` without `.` and `..`, in no particular order.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirItem>>;

    fn stat(&self, path: &Path) -> io::Result<EntryInfo>;
}

/// `FileSystem` over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|m| m.is_dir())
    }

    fn is_readable(&self, dir: &Path) -> bool {
        match fs::read_dir(dir) {
            Ok(_) => true,
            Err(e) => e.kind() != ErrorKind::PermissionDenied,
        }
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirItem>> {
        let mut items = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry: DirEntry = match entry {
                Ok(entry) => entry,
                // Vanished between readdir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            let is_symlink = entry.file_type().is_ok_and(|t| t.is_symlink());
            let is_dir = if is_symlink {
                fs::metadata(entry.path()).is_ok_and(|m| m.is_dir())
            } else {
                entry.file_type().is_ok_and(|t| t.is_dir())
            };

            items.push(DirItem::new(entry.file_name(), is_dir, is_symlink));
        }

        Ok(items)
    }

    fn stat(&self, path: &Path) -> io::Result<EntryInfo> {
        EntryInfo::from_path_sync(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_dir_reports_kinds() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file"), b"x").unwrap();
        fs::create_dir(tmp.path().join("dir")).unwrap();

        let mut items = RealFileSystem.read_dir(tmp.path()).unwrap();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "dir");
        assert!(items[0].is_dir);
        assert_eq!(items[1].name, "file");
        assert!(!items[1].is_dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_dir_is_dir_and_symlink() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("alias")).unwrap();

        let items = RealFileSystem.read_dir(tmp.path()).unwrap();
        let alias = items.iter().find(|i| i.name == "alias").unwrap();

        assert!(alias.is_dir);
        assert!(alias.is_symlink);
        assert!(RealFileSystem.is_symlink(&tmp.path().join("alias")));
    }

    #[test]
    fn missing_dir_is_not_existing() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let file = tmp.path().join("file");
        fs::write(&file, b"x").unwrap();

        assert!(!RealFileSystem.dir_exists(&missing));
        assert!(!RealFileSystem.dir_exists(&file));
        assert!(RealFileSystem.dir_exists(tmp.path()));
        assert!(RealFileSystem.is_readable(tmp.path()));
    }
}
