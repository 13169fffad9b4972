//! `src/fs/entry_info.rs`
//! ============================================================
//! Point-in-time records of directory entries.
//!
//! `EntryInfo` is the identity/display record produced by a directory read.
//! It never changes after construction; a re-read replaces it wholesale.
//! `EntryView` is the per-row UI state (selection, filter match, pending
//! deletion) that the directory model keeps index-aligned next to it.

// ------------------------------------------------------------
// Standard-library imports
// ------------------------------------------------------------

use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, FileType, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

// ------------------------------------------------------------
// Third-party crate imports
// ------------------------------------------------------------

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------
// Local-crate imports
// ------------------------------------------------------------

use crate::util::humanize;

// ------------------------------------------------------------
// EntryKind: coarse classification used for labels.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

impl EntryKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "folder",
            Self::Symlink => "link",
            Self::Other => "special",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ------------------------------------------------------------
// Permissions: owner/group/other rwx bits plus a type glyph.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    /// Lower nine permission bits (`0o777` mask).
    bits: u16,
    /// `d`, `l`, `-`, `c`, `b`, `p`, `s` or `?`.
    glyph: char,
}

impl Permissions {
    #[must_use]
    pub const fn new(mode: u32, glyph: char) -> Self {
        Self {
            bits: (mode & 0o777) as u16,
            glyph,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.bits
    }

    #[must_use]
    pub const fn glyph(self) -> char {
        self.glyph
    }

    #[must_use]
    pub const fn owner_readable(self) -> bool {
        self.bits & 0o400 != 0
    }

    #[must_use]
    pub const fn owner_writable(self) -> bool {
        self.bits & 0o200 != 0
    }

    #[must_use]
    pub const fn owner_executable(self) -> bool {
        self.bits & 0o100 != 0
    }

    fn from_metadata(link_type: FileType, meta: &Metadata) -> Self {
        Self::new(mode_of(meta), glyph_of(link_type))
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FLAGS: [(u16, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];

        let mut out = String::with_capacity(10);
        out.push(self.glyph);
        for (mask, c) in FLAGS {
            out.push(if self.bits & mask != 0 { c } else { '-' });
        }
        f.write_str(&out)
    }
}

#[cfg(unix)]
fn mode_of(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() { 0o555 } else { 0o777 }
}

#[cfg(unix)]
fn glyph_of(ftype: FileType) -> char {
    use std::os::unix::fs::FileTypeExt;

    if ftype.is_symlink() {
        'l'
    } else if ftype.is_dir() {
        'd'
    } else if ftype.is_file() {
        '-'
    } else if ftype.is_char_device() {
        'c'
    } else if ftype.is_block_device() {
        'b'
    } else if ftype.is_fifo() {
        'p'
    } else if ftype.is_socket() {
        's'
    } else {
        '?'
    }
}

#[cfg(not(unix))]
fn glyph_of(ftype: FileType) -> char {
    if ftype.is_symlink() {
        'l'
    } else if ftype.is_dir() {
        'd'
    } else {
        '-'
    }
}

// ------------------------------------------------------------
// EntryInfo: identity and display attributes of one entry.
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Absolute path, shared between listings and edits.
    pub path: Arc<PathBuf>,

    pub name: CompactString,

    /// Byte length (of the link target for resolvable symlinks).
    pub size: u64,

    pub modified: SystemTime,

    /// Not every filesystem reports a birth time.
    pub created: Option<SystemTime>,

    pub permissions: Permissions,

    pub is_symlink: bool,

    pub symlink_target: Option<PathBuf>,

    /// Directory after following at most one symlink hop.
    pub is_dir_at_end: bool,

    pub kind: EntryKind,
}

impl EntryInfo {
    /// Stat `path` and build a snapshot.
    ///
    /// A symlink reports the size, timestamps and permissions of its target
    /// when the target resolves, and its own otherwise (dangling link).
    pub fn from_path_sync(path: &Path) -> io::Result<Self> {
        let link_meta: Metadata = fs::symlink_metadata(path)?;
        let link_type: FileType = link_meta.file_type();
        let is_symlink = link_type.is_symlink();

        let name = CompactString::new(
            path.file_name()
                .map(OsStr::to_string_lossy)
                .unwrap_or_default(),
        );

        let (meta, symlink_target, is_dir_at_end) = if is_symlink {
            let target = fs::read_link(path).ok();
            let one_hop_dir = target
                .as_deref()
                .map(|t: &Path| resolve_link_target(path, t))
                .and_then(|t: PathBuf| fs::symlink_metadata(t).ok())
                .is_some_and(|m: Metadata| m.is_dir());
            let resolved = fs::metadata(path).unwrap_or(link_meta);

            (resolved, target, one_hop_dir)
        } else {
            let is_dir = link_type.is_dir();
            (link_meta, None, is_dir)
        };

        let kind = if is_symlink {
            EntryKind::Symlink
        } else if link_type.is_dir() {
            EntryKind::Dir
        } else if link_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        Ok(Self {
            path: Arc::new(path.to_path_buf()),
            name,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            created: meta.created().ok(),
            permissions: Permissions::from_metadata(link_type, &meta),
            is_symlink,
            symlink_target,
            is_dir_at_end,
            kind,
        })
    }

    /// Identity comparison used when diffing listings.
    ///
    /// Covers name, size, permissions, modification time, symlink flag and
    /// resolved-directory flag. Path, creation time and kind are derived from
    /// or irrelevant to these and are not compared.
    #[inline]
    #[must_use]
    pub fn same_entry(&self, other: &Self) -> bool {
        self.name == other.name
            && self.size == other.size
            && self.permissions == other.permissions
            && self.modified == other.modified
            && self.is_symlink == other.is_symlink
            && self.is_dir_at_end == other.is_dir_at_end
    }

    #[inline]
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Text after the last dot of the name, empty when there is none.
    #[must_use]
    pub fn suffix(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => "",
            Some(idx) => &self.name[idx + 1..],
        }
    }

    #[must_use]
    pub fn size_label(&self) -> String {
        if self.is_symlink && self.is_dir_at_end {
            "dir-link".to_string()
        } else if self.kind == EntryKind::Dir {
            "dir".to_string()
        } else {
            humanize::human_readable_size(self.size)
        }
    }

    #[must_use]
    pub fn modified_label(&self) -> String {
        humanize::datetime_label(self.modified)
    }

    #[must_use]
    pub fn created_label(&self) -> String {
        self.created.map(humanize::datetime_label).unwrap_or_default()
    }

    #[must_use]
    pub fn permissions_label(&self) -> String {
        self.permissions.to_string()
    }
}

fn resolve_link_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent()
            .map_or_else(|| target.to_path_buf(), |parent: &Path| parent.join(target))
    }
}

// ------------------------------------------------------------
// EntryView: transient per-row UI state.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryView {
    pub selected: bool,
    pub matched: bool,
    pub doomed: bool,
}

impl EntryView {
    #[must_use]
    pub const fn matched(matched: bool) -> Self {
        Self {
            selected: false,
            matched,
            doomed: false,
        }
    }

    /// Apply a selection value. Doomed rows can never become selected.
    /// Returns whether the stored value changed.
    pub const fn set_selected(&mut self, selected: bool) -> bool {
        if selected && self.doomed {
            return false;
        }
        let changed = self.selected != selected;
        self.selected = selected;
        changed
    }

    /// Flag as pending deletion, forcing deselection in the same step.
    pub const fn mark_doomed(&mut self) {
        self.doomed = true;
        self.selected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample(name: &str, size: u64) -> EntryInfo {
        EntryInfo {
            path: Arc::new(PathBuf::from("/tmp").join(name)),
            name: CompactString::new(name),
            size,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
            created: None,
            permissions: Permissions::new(0o644, '-'),
            is_symlink: false,
            symlink_target: None,
            is_dir_at_end: false,
            kind: EntryKind::File,
        }
    }

    #[test]
    fn permissions_render_like_ls() {
        assert_eq!(Permissions::new(0o755, 'd').to_string(), "drwxr-xr-x");
        assert_eq!(Permissions::new(0o640, '-').to_string(), "-rw-r-----");
        assert!(Permissions::new(0o700, '-').owner_executable());
    }

    #[test]
    fn identity_ignores_path_and_created() {
        let a = sample("a.txt", 10);
        let mut b = a.clone();
        b.path = Arc::new(PathBuf::from("/elsewhere/a.txt"));
        b.created = Some(SystemTime::now());

        assert!(a.same_entry(&b));
    }

    #[test]
    fn identity_tracks_size_and_permissions() {
        let a = sample("a.txt", 10);

        let mut grown = a.clone();
        grown.size = 11;
        assert!(!a.same_entry(&grown));

        let mut chmod = a.clone();
        chmod.permissions = Permissions::new(0o600, '-');
        assert!(!a.same_entry(&chmod));
    }

    #[test]
    fn suffix_ignores_leading_dot() {
        assert_eq!(sample("archive.tar.gz", 0).suffix(), "gz");
        assert_eq!(sample(".bashrc", 0).suffix(), "");
        assert_eq!(sample("Makefile", 0).suffix(), "");
    }

    #[test]
    fn doomed_rows_refuse_selection() {
        let mut view = EntryView::matched(true);
        assert!(view.set_selected(true));

        view.mark_doomed();
        assert!(!view.selected);
        assert!(!view.set_selected(true));
        assert!(!view.selected);
    }

    #[test]
    fn stat_regular_file_and_dir() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, b"0123456789").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let info = EntryInfo::from_path_sync(&file).unwrap();
        assert_eq!(info.name, "a.txt");
        assert_eq!(info.size, 10);
        assert_eq!(info.kind, EntryKind::File);
        assert!(!info.is_dir_at_end);

        let dir = EntryInfo::from_path_sync(&tmp.path().join("sub")).unwrap();
        assert_eq!(dir.kind, EntryKind::Dir);
        assert!(dir.is_dir_at_end);
        assert_eq!(dir.size_label(), "dir");
    }

    #[cfg(unix)]
    #[test]
    fn stat_symlink_to_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink("real", tmp.path().join("alias")).unwrap();

        let info = EntryInfo::from_path_sync(&tmp.path().join("alias")).unwrap();
        assert!(info.is_symlink);
        assert!(info.is_dir_at_end);
        assert_eq!(info.kind, EntryKind::Symlink);
        assert_eq!(info.symlink_target.as_deref(), Some(Path::new("real")));
        assert_eq!(info.permissions.glyph(), 'l');
        assert_eq!(info.size_label(), "dir-link");
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_still_stats() {
        let tmp = TempDir::new().unwrap();
        std::os::unix::fs::symlink("missing", tmp.path().join("broken")).unwrap();

        let info = EntryInfo::from_path_sync(&tmp.path().join("broken")).unwrap();
        assert!(info.is_symlink);
        assert!(!info.is_dir_at_end);
    }
}
