use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

use compact_str::CompactString;
use parking_lot::Mutex;

use super::entry_info::{EntryInfo, EntryKind, Permissions};
use super::filesystem::{DirItem, FileSystem};

/// In-memory filesystem for worker tests.
#[derive(Clone, Default)]
pub struct MockFileSystem {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<PathBuf, EntryInfo>,
    children: HashMap<PathBuf, Vec<PathBuf>>,
    denied: HashSet<PathBuf>,
    failing: HashMap<PathBuf, ErrorKind>,
    read_dir_calls: Vec<PathBuf>,
    panic_once: HashSet<PathBuf>,
    gate: Option<Arc<Mutex<mpsc::Receiver<()>>>>,
}

impl Inner {
    fn link_child(&mut self, path: &Path) {
        if let Some(parent) = path.parent() {
            let siblings = self.children.entry(parent.to_path_buf()).or_default();
            if !siblings.iter().any(|p| p == path) {
                siblings.push(path.to_path_buf());
            }
        }
    }
}

pub fn mock_entry(path: &Path, size: u64, is_dir: bool, is_symlink: bool) -> EntryInfo {
    let kind = match (is_symlink, is_dir) {
        (true, _) => EntryKind::Symlink,
        (false, true) => EntryKind::Dir,
        (false, false) => EntryKind::File,
    };
    let glyph = match kind {
        EntryKind::Symlink => 'l',
        EntryKind::Dir => 'd',
        _ => '-',
    };

    EntryInfo {
        path: Arc::new(path.to_path_buf()),
        name: CompactString::new(
            path.file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default(),
        ),
        size,
        modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
        created: None,
        permissions: Permissions::new(if is_dir { 0o755 } else { 0o644 }, glyph),
        is_symlink,
        symlink_target: None,
        is_dir_at_end: is_dir,
        kind,
    }
}

impl MockFileSystem {
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut inner = self.inner.lock();
        inner.link_child(&path);
        inner
            .nodes
            .insert(path.clone(), mock_entry(&path, 4096, true, false));
        inner.children.entry(path).or_default();
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, size: u64) {
        let path = path.into();
        let mut inner = self.inner.lock();
        inner.link_child(&path);
        inner.nodes.insert(path.clone(), mock_entry(&path, size, false, false));
    }

    /// A symlink that resolves to a directory. Enumerating through it lists
    /// the target's children.
    pub fn add_dir_link(&self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        let path = path.into();
        let target = target.into();
        let mut inner = self.inner.lock();
        inner.link_child(&path);
        let mut entry = mock_entry(&path, 4096, true, true);
        entry.symlink_target = Some(target.clone());
        inner.nodes.insert(path.clone(), entry);
        let target_children = inner.children.get(&target).cloned().unwrap_or_default();
        inner.children.insert(path, target_children);
    }

    /// Stat fails from now on, but enumeration of the parent still lists it.
    pub fn vanish(&self, path: impl AsRef<Path>) {
        self.inner.lock().nodes.remove(path.as_ref());
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        inner.nodes.remove(path);
        inner.children.remove(path);
        if let Some(parent) = path.parent()
            && let Some(siblings) = inner.children.get_mut(parent)
        {
            siblings.retain(|p| p != path);
        }
    }

    pub fn deny(&self, path: impl Into<PathBuf>) {
        self.inner.lock().denied.insert(path.into());
    }

    pub fn fail(&self, path: impl Into<PathBuf>, kind: ErrorKind) {
        self.inner.lock().failing.insert(path.into(), kind);
    }

    /// The next `read_dir` of `path` panics.
    pub fn panic_on(&self, path: impl Into<PathBuf>) {
        self.inner.lock().panic_once.insert(path.into());
    }

    /// Make every `read_dir` wait for one message on the returned sender.
    /// Dropping the sender releases all waiting and future reads.
    pub fn hold_reads(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.inner.lock().gate = Some(Arc::new(Mutex::new(rx)));
        tx
    }

    pub fn read_dir_calls(&self) -> Vec<PathBuf> {
        self.inner.lock().read_dir_calls.clone()
    }
}

impl FileSystem for MockFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        self.inner.lock().children.contains_key(path)
    }

    fn is_readable(&self, dir: &Path) -> bool {
        !self.inner.lock().denied.contains(dir)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .nodes
            .get(path)
            .is_some_and(|e| e.is_symlink)
    }

    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirItem>> {
        let gate = self.inner.lock().gate.clone();
        if let Some(gate) = gate {
            let _ = gate.lock().recv();
        }

        let mut inner = self.inner.lock();
        inner.read_dir_calls.push(dir.to_path_buf());

        if inner.panic_once.remove(dir) {
            drop(inner);
            panic!("injected panic reading {}", dir.display());
        }

        if let Some(kind) = inner.failing.get(dir) {
            return Err(io::Error::new(*kind, "injected failure"));
        }
        if inner.denied.contains(dir) {
            return Err(io::Error::new(ErrorKind::PermissionDenied, "denied"));
        }

        let children = inner
            .children
            .get(dir)
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "no such directory"))?;

        Ok(children
            .iter()
            .map(|child| {
                let node = inner.nodes.get(child);
                DirItem::new(
                    child.file_name().map(OsStr::to_os_string).unwrap_or_default(),
                    node.is_some_and(|e| e.is_dir_at_end),
                    node.is_some_and(|e| e.is_symlink),
                )
            })
            .collect())
    }

    fn stat(&self, path: &Path) -> io::Result<EntryInfo> {
        self.inner
            .lock()
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "no such entry"))
    }
}
