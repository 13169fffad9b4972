//! src/operators/directory_worker.rs
//! ============================================================================
//! # `DirectoryWorker`: Background Directory Listing
//!
//! One read at a time per worker. A full read reports the complete listing;
//! a diff read lists the directory again and streams the edits against the
//! caller's previous listing before reporting the reconciled one.
//!
//! Reads run on the blocking pool and report over an unbounded channel.
//! Every event carries the id of the task that produced it. A cancelled
//! read stops emitting and sends nothing further, not even `Done`; callers
//! that need to know when it has wound down use
//! [`DirectoryWorker::cancel_and_wait`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::fs::entry_info::EntryInfo;
use crate::fs::filesystem::{DirItem, FileSystem};
use crate::model::listing_policy::ListingPolicy;
use crate::model::name_filter::NameFilter;
use crate::operators::listing_diff::{Edit, diff_streaming};
use crate::settings::SettingsProvider;
use crate::util::running_guard::RunningGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Full,
    Diff,
}

#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    /// Diff mode only, emitted as found.
    Removed {
        task_id: u64,
        index: usize,
        entry: EntryInfo,
    },

    /// Diff mode only, emitted as found.
    Inserted {
        task_id: u64,
        index: usize,
        entry: EntryInfo,
    },

    /// In diff mode `entries` is the listing the edits produce.
    Done {
        task_id: u64,
        mode: ReadMode,
        entries: Vec<EntryInfo>,
    },

    Error { task_id: u64, error: AppError },
}

impl DirectoryEvent {
    #[must_use]
    pub const fn task_id(&self) -> u64 {
        match self {
            Self::Removed { task_id, .. }
            | Self::Inserted { task_id, .. }
            | Self::Done { task_id, .. }
            | Self::Error { task_id, .. } => *task_id,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

struct ActiveRead {
    task_id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Directory and policy of the previous read, to tell a plain refresh from
/// a reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LastRead {
    dir: PathBuf,
    policy: ListingPolicy,
}

pub struct DirectoryWorker {
    fs: Arc<dyn FileSystem>,
    settings: Arc<dyn SettingsProvider>,
    event_tx: UnboundedSender<DirectoryEvent>,
    running: Arc<AtomicBool>,
    last_read: Arc<Mutex<Option<LastRead>>>,
    next_task_id: u64,
    active: Option<ActiveRead>,
}

impl DirectoryWorker {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        settings: Arc<dyn SettingsProvider>,
        event_tx: UnboundedSender<DirectoryEvent>,
    ) -> Self {
        Self {
            fs,
            settings,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            last_read: Arc::new(Mutex::new(None)),
            next_task_id: 0,
            active: None,
        }
    }

    /// Start a full listing of `dir`. Must be called within a Tokio runtime.
    ///
    /// A non-empty `name_filter` restricts membership to names matching it.
    pub fn start_read_full(&mut self, dir: &Path, name_filter: &str) -> AppResult<u64> {
        self.start(ReadMode::Full, Vec::new(), dir, name_filter)
    }

    /// Start a diff-mode read of `dir` against `old_entries`.
    pub fn start_read_changed(
        &mut self,
        old_entries: Vec<EntryInfo>,
        dir: &Path,
        name_filter: &str,
    ) -> AppResult<u64> {
        self.start(ReadMode::Diff, old_entries, dir, name_filter)
    }

    /// Request cooperative cancellation of the active read, if any.
    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            debug!(task_id = active.task_id, "Cancelling directory read");
            active.token.cancel();
        }
    }

    /// Cancel the active read and wait until its task has returned.
    pub async fn cancel_and_wait(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.token.cancel();
        if let Err(e) = active.handle.await {
            error!(task_id = active.task_id, error = %e, "Directory read task panicked");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Id of the most recently started read.
    #[must_use]
    pub fn current_task_id(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.task_id)
    }

    #[instrument(
        name = "spawn_directory_read",
        level = "debug",
        skip(self, mode, old_entries, dir),
        fields(mode = ?mode, path = %dir.display(), old_count = old_entries.len())
    )]
    fn start(
        &mut self,
        mode: ReadMode,
        old_entries: Vec<EntryInfo>,
        dir: &Path,
        name_filter: &str,
    ) -> AppResult<u64> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(path = %dir.display(), "Directory read rejected, one is already running");
            return Err(AppError::AlreadyRunning {
                task: "Directory read",
            });
        }

        self.next_task_id += 1;
        let task_id = self.next_task_id;
        let token = CancellationToken::new();

        let job = ReadJob {
            task_id,
            mode,
            dir: dir.to_path_buf(),
            name_filter: NameFilter::new(name_filter),
            old_entries,
            fs: Arc::clone(&self.fs),
            settings: Arc::clone(&self.settings),
            event_tx: self.event_tx.clone(),
            running: Arc::clone(&self.running),
            last_read: Arc::clone(&self.last_read),
            token: token.clone(),
        };

        let handle: JoinHandle<()> = tokio::task::spawn_blocking(move || job.run());
        self.active = Some(ActiveRead {
            task_id,
            token,
            handle,
        });

        info!(task_id, mode = ?mode, path = %dir.display(), "Directory read started");
        Ok(task_id)
    }
}

impl Drop for DirectoryWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ------------------------------------------------------------
// ReadJob: the body running on the blocking pool
// ------------------------------------------------------------

struct ReadJob {
    task_id: u64,
    mode: ReadMode,
    dir: PathBuf,
    name_filter: NameFilter,
    old_entries: Vec<EntryInfo>,
    fs: Arc<dyn FileSystem>,
    settings: Arc<dyn SettingsProvider>,
    event_tx: UnboundedSender<DirectoryEvent>,
    running: Arc<AtomicBool>,
    last_read: Arc<Mutex<Option<LastRead>>>,
    token: CancellationToken,
}

impl ReadJob {
    #[instrument(
        name = "directory_read",
        level = "info",
        skip(self),
        fields(task_id = self.task_id, mode = ?self.mode, path = %self.dir.display())
    )]
    fn run(mut self) {
        let running = RunningGuard::new(Arc::clone(&self.running));
        let outcome: AppResult<Option<Vec<EntryInfo>>> = self.execute();

        // Cleared before the terminal event so its receiver may start anew.
        running.release();

        let event = match outcome {
            Ok(Some(entries)) => {
                info!(
                    marker = "DIRECTORY_READ_DONE",
                    entries_count = entries.len(),
                    "Directory read completed"
                );
                DirectoryEvent::Done {
                    task_id: self.task_id,
                    mode: self.mode,
                    entries,
                }
            }
            Ok(None) => {
                warn!("Directory listing cancelled");
                return;
            }
            Err(e) => {
                if e.is_internal() {
                    error!(error = %e, "Directory read aborted");
                } else {
                    warn!(error = %e, "Directory read failed");
                }
                DirectoryEvent::Error {
                    task_id: self.task_id,
                    error: e,
                }
            }
        };

        self.send(event);
    }

    /// `Ok(None)` when cancelled.
    fn execute(&mut self) -> AppResult<Option<Vec<EntryInfo>>> {
        self.verify_directory()?;

        let policy = ListingPolicy::resolve(self.settings.as_ref(), &self.dir);
        self.note_policy(policy);

        let Some(entries) = self.read_entries(&policy)? else {
            return Ok(None);
        };

        match self.mode {
            ReadMode::Full => Ok(Some(entries)),
            ReadMode::Diff => {
                let old: Vec<EntryInfo> = std::mem::take(&mut self.old_entries);
                let task_id = self.task_id;
                let tx = &self.event_tx;

                Ok(diff_streaming(old, &entries, &self.token, |edit: Edit| {
                    let event = match edit {
                        Edit::Remove { index, entry } => DirectoryEvent::Removed {
                            task_id,
                            index,
                            entry,
                        },
                        Edit::Insert { index, entry } => DirectoryEvent::Inserted {
                            task_id,
                            index,
                            entry,
                        },
                    };
                    if tx.send(event).is_err() {
                        debug!(task_id, "Directory event receiver dropped");
                    }
                }))
            }
        }
    }

    fn verify_directory(&self) -> AppResult<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(AppError::EmptyDirectory);
        }
        if !self.fs.dir_exists(&self.dir) {
            return Err(AppError::NotFound(self.dir.clone()));
        }
        if !self.fs.is_readable(&self.dir) {
            return Err(AppError::PermissionDenied(self.dir.clone()));
        }
        Ok(())
    }

    /// Record the policy for this directory. Nothing is reused across reads:
    /// there is no open directory handle to keep, and enumeration order is
    /// unspecified, so every read sorts again.
    fn note_policy(&self, policy: ListingPolicy) {
        let current = LastRead {
            dir: self.dir.clone(),
            policy,
        };
        let mut last = self.last_read.lock();

        if last.as_ref() == Some(&current) {
            debug!("Directory refreshed with unchanged policy");
        } else {
            debug!(
                show_hidden = policy.show_hidden,
                sort_role = %policy.sort_role,
                reversed = policy.reversed,
                dirs_first = policy.dirs_first,
                case_sensitive = policy.case_sensitive,
                "Directory listing reconfigured"
            );
            *last = Some(current);
        }
    }

    /// Enumerate, filter, stat and sort. `Ok(None)` when cancelled.
    fn read_entries(&self, policy: &ListingPolicy) -> AppResult<Option<Vec<EntryInfo>>> {
        let items: Vec<DirItem> = self.fs.read_dir(&self.dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::NotFound(self.dir.clone()),
            ErrorKind::PermissionDenied => AppError::PermissionDenied(self.dir.clone()),
            _ => AppError::Io(e),
        })?;

        if self.token.is_cancelled() {
            return Ok(None);
        }

        let mut entries: Vec<EntryInfo> = Vec::with_capacity(items.len());
        for item in items {
            if self.token.is_cancelled() {
                return Ok(None);
            }
            if !policy.includes(&item.name) || !self.name_filter.matches(&item.name) {
                continue;
            }

            let path = item.path_in(&self.dir);
            match self.fs.stat(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Entry vanished before stat, skipping");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat entry, skipping");
                }
            }
        }

        policy.sort(&mut entries);
        Ok(Some(entries))
    }

    fn send(&self, event: DirectoryEvent) {
        if let Err(e) = self.event_tx.send(event) {
            warn!(task_id = self.task_id, "Failed to send directory event: {}", e);
        }
    }
}
