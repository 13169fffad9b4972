//! src/operators/search_worker.rs
//! ============================================================================
//! # `SearchWorker`: Cancellable Recursive Filename Search
//!
//! Depth-first walk from a root directory. In every directory visited, file
//! names are matched first, then subdirectory names; a subdirectory is
//! matched before it is entered. Matching is a case-insensitive substring
//! test. Matches stream out as they are found.
//!
//! Symlinked directories are never entered, although their names can still
//! match. Configured pseudo-filesystem roots are skipped entirely.
//! Directories that vanish or cannot be read count as empty.
//!
//! Every run ends with `Progress("")` followed by `Done`, including a
//! cancelled one. A traversal failure stops the walk and is reported once,
//! with the directory it happened in, before those two events.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SearchConfig;
use crate::error::{AppError, AppResult};
use crate::fs::filesystem::{DirItem, FileSystem};
use crate::util::running_guard::RunningGuard;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Subtrees never entered, compared component-wise.
    pub excluded_roots: Vec<PathBuf>,
    pub include_hidden: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            excluded_roots: config.excluded_roots.clone(),
            include_hidden: config.include_hidden,
        }
    }
}

impl SearchOptions {
    #[must_use]
    pub fn is_excluded(&self, dir: &Path) -> bool {
        self.excluded_roots.iter().any(|root| dir.starts_with(root))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// Directory being searched; empty once the run is over.
    Progress(String),
    Match(PathBuf),
    Error { message: String, directory: PathBuf },
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchUpdate {
    pub task_id: u64,
    pub event: SearchEvent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub directories: usize,
    pub matches: usize,
    pub cancelled: bool,
}

/// Run a whole search synchronously, terminal events included.
pub fn search_tree<F>(
    fs: &dyn FileSystem,
    root: &Path,
    term: &str,
    options: &SearchOptions,
    token: &CancellationToken,
    sink: F,
) -> SearchStats
where
    F: FnMut(SearchEvent),
{
    let mut walk = Walk {
        fs,
        term: term.to_lowercase(),
        options,
        token,
        sink,
        stats: SearchStats::default(),
    };

    if let Err(e) = walk.visit(root) {
        let directory = match &e {
            AppError::Traversal { directory, .. } => directory.clone(),
            _ => root.to_path_buf(),
        };
        error!(directory = %directory.display(), error = %e, "Search traversal failed");
        (walk.sink)(SearchEvent::Error {
            message: e.user_message(),
            directory,
        });
    }

    walk.stats.cancelled = token.is_cancelled();
    (walk.sink)(SearchEvent::Progress(String::new()));
    (walk.sink)(SearchEvent::Done);
    walk.stats
}

struct Walk<'a, F> {
    fs: &'a dyn FileSystem,
    /// Lowercased.
    term: String,
    options: &'a SearchOptions,
    token: &'a CancellationToken,
    sink: F,
    stats: SearchStats,
}

impl<F: FnMut(SearchEvent)> Walk<'_, F> {
    fn visit(&mut self, dir: &Path) -> AppResult<()> {
        if self.options.is_excluded(dir) {
            debug!(path = %dir.display(), "Skipping excluded subtree");
            return Ok(());
        }
        if self.fs.is_symlink(dir) || !self.fs.dir_exists(dir) {
            return Ok(());
        }

        self.stats.directories += 1;
        (self.sink)(SearchEvent::Progress(dir.to_string_lossy().into_owned()));

        let items: Vec<DirItem> = match self.fs.read_dir(dir) {
            Ok(items) => items,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(path = %dir.display(), error = %e, "Unreadable directory, treating as empty");
                return Ok(());
            }
            Err(e) => return Err(AppError::traversal(dir, e.to_string())),
        };

        let (mut dirs, mut files): (Vec<DirItem>, Vec<DirItem>) = items
            .into_iter()
            .filter(|item: &DirItem| self.options.include_hidden || !item.is_hidden())
            .partition(|item: &DirItem| item.is_dir);
        files.sort_by(|a, b| a.name.cmp(&b.name));
        dirs.sort_by(|a, b| a.name.cmp(&b.name));

        for file in &files {
            if self.token.is_cancelled() {
                return Ok(());
            }
            self.check_name(dir, file);
        }

        for sub in &dirs {
            if self.token.is_cancelled() {
                return Ok(());
            }
            self.check_name(dir, sub);
            self.visit(&sub.path_in(dir))?;
        }

        Ok(())
    }

    fn check_name(&mut self, dir: &Path, item: &DirItem) {
        if item.name.to_lowercase().contains(&self.term) {
            self.stats.matches += 1;
            (self.sink)(SearchEvent::Match(item.path_in(dir)));
        }
    }
}

// ------------------------------------------------------------
// SearchWorker: one search at a time on the blocking pool
// ------------------------------------------------------------

struct ActiveSearch {
    task_id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SearchWorker {
    fs: Arc<dyn FileSystem>,
    options: SearchOptions,
    event_tx: UnboundedSender<SearchUpdate>,
    running: Arc<AtomicBool>,
    next_task_id: u64,
    active: Option<ActiveSearch>,
}

impl SearchWorker {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        options: SearchOptions,
        event_tx: UnboundedSender<SearchUpdate>,
    ) -> Self {
        Self {
            fs,
            options,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
            next_task_id: 0,
            active: None,
        }
    }

    /// Start searching `root` for names containing `term`. Must be called
    /// within a Tokio runtime.
    #[instrument(
        name = "spawn_search",
        level = "info",
        skip(self, root),
        fields(root = %root.display(), task_id = tracing::field::Empty)
    )]
    pub fn start_search(&mut self, root: &Path, term: &str) -> AppResult<u64> {
        if self.is_running() {
            warn!("Search rejected, one is already running");
            return Err(AppError::AlreadyRunning { task: "Search" });
        }
        if root.as_os_str().is_empty() || term.is_empty() {
            warn!("Search rejected, empty root or term");
            return Err(AppError::BadSearchParameters);
        }

        self.running.store(true, Ordering::Release);
        self.next_task_id += 1;
        let task_id = self.next_task_id;
        tracing::Span::current().record("task_id", task_id);

        let token = CancellationToken::new();
        let job_token = token.clone();
        let fs = Arc::clone(&self.fs);
        let options = self.options.clone();
        let tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let root = root.to_path_buf();
        let term = term.to_string();

        let handle = tokio::task::spawn_blocking(move || {
            let running = RunningGuard::new(running);
            let started = Instant::now();
            let stats = search_tree(fs.as_ref(), &root, &term, &options, &job_token, |event| {
                if event == SearchEvent::Done {
                    running.release();
                }
                if tx.send(SearchUpdate { task_id, event }).is_err() {
                    debug!(task_id, "Search event receiver dropped");
                }
            });

            if stats.cancelled {
                warn!(task_id, matches = stats.matches, "Search cancelled");
            } else {
                info!(
                    marker = "SEARCH_DONE",
                    task_id,
                    directories = stats.directories,
                    matches = stats.matches,
                    duration_ms = started.elapsed().as_millis(),
                    "Search completed"
                );
            }
        });

        self.active = Some(ActiveSearch {
            task_id,
            token,
            handle,
        });
        info!(task_id, "Search started");
        Ok(task_id)
    }

    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            debug!(task_id = active.task_id, "Cancelling search");
            active.token.cancel();
        }
    }

    /// Cancel the active search and wait until its task has returned.
    pub async fn cancel_and_wait(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.token.cancel();
        if let Err(e) = active.handle.await {
            error!(task_id = active.task_id, error = %e, "Search task panicked");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::filesystem::RealFileSystem;
    use crate::fs::mock::MockFileSystem;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn collect(fs: &dyn FileSystem, root: &Path, term: &str, options: &SearchOptions) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        let token = CancellationToken::new();
        search_tree(fs, root, term, options, &token, |e| events.push(e));
        events
    }

    fn matched_paths(events: &[SearchEvent]) -> Vec<PathBuf> {
        events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Match(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn ends_with_terminal(events: &[SearchEvent]) -> bool {
        events.ends_with(&[SearchEvent::Progress(String::new()), SearchEvent::Done])
    }

    async fn until_done(rx: &mut UnboundedReceiver<SearchUpdate>) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        while let Some(update) = rx.recv().await {
            let done = update.event == SearchEvent::Done;
            events.push(update.event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn files_match_before_dirs_case_insensitively() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("Notes/deep")).unwrap();
        fs::write(root.join("notes.txt"), b"").unwrap();
        fs::write(root.join("other.txt"), b"").unwrap();
        fs::write(root.join("Notes/deep/MyNOTES.md"), b"").unwrap();

        let events = collect(&RealFileSystem, root, "NOTE", &SearchOptions::default());

        assert_eq!(
            matched_paths(&events),
            [
                root.join("notes.txt"),
                root.join("Notes"),
                root.join("Notes/deep/MyNOTES.md"),
            ]
        );
        assert_eq!(
            events[0],
            SearchEvent::Progress(root.to_string_lossy().into_owned())
        );
        assert!(ends_with_terminal(&events));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_terminates() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("a")).unwrap();
        std::os::unix::fs::symlink(root, root.join("a/loop")).unwrap();

        let events = collect(&RealFileSystem, root, "loop", &SearchOptions::default());

        // The link's name is matched, the link itself is never entered.
        assert_eq!(matched_paths(&events), [root.join("a/loop")]);
        let visited: Vec<&SearchEvent> = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Progress(p) if !p.is_empty()))
            .collect();
        assert_eq!(visited.len(), 2);
        assert!(ends_with_terminal(&events));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_directories_are_entered() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let odd_dir = root.join(OsStr::from_bytes(b"dir\xff"));
        fs::create_dir(&odd_dir).unwrap();
        fs::write(odd_dir.join("target.txt"), b"").unwrap();
        fs::write(root.join(OsStr::from_bytes(b"target\xfe")), b"").unwrap();

        let events = collect(&RealFileSystem, root, "target", &SearchOptions::default());

        let found = matched_paths(&events);
        assert_eq!(
            found,
            [root.join(OsStr::from_bytes(b"target\xfe")), odd_dir.join("target.txt")]
        );
        assert!(found.iter().all(|p| p.exists()));
    }

    #[test]
    fn cancel_after_first_match_stops_the_stream() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_file("/r/hit1", 1);
        mock.add_file("/r/hit2", 1);
        mock.add_dir("/r/sub");
        mock.add_file("/r/sub/hit3", 1);

        let token = CancellationToken::new();
        let mut events = Vec::new();
        let stats = search_tree(&mock, Path::new("/r"), "hit", &SearchOptions::default(), &token, |e| {
            if matches!(e, SearchEvent::Match(_)) {
                token.cancel();
            }
            events.push(e);
        });

        assert!(stats.cancelled);
        assert_eq!(
            events,
            [
                SearchEvent::Progress("/r".into()),
                SearchEvent::Match(PathBuf::from("/r/hit1")),
                SearchEvent::Progress(String::new()),
                SearchEvent::Done,
            ]
        );
    }

    #[test]
    fn excluded_roots_are_never_entered() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_dir("/r/proc");
        mock.add_file("/r/proc/target", 1);
        mock.add_dir("/r/procfs");
        mock.add_file("/r/procfs/target", 1);

        let options = SearchOptions {
            excluded_roots: vec![PathBuf::from("/r/proc")],
            include_hidden: false,
        };
        let events = collect(&mock, Path::new("/r"), "target", &options);

        assert_eq!(matched_paths(&events), [PathBuf::from("/r/procfs/target")]);
        assert!(!mock.read_dir_calls().contains(&PathBuf::from("/r/proc")));
    }

    #[test]
    fn hidden_entries_follow_options() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_file("/r/.secret", 1);
        mock.add_dir("/r/.cache");
        mock.add_file("/r/.cache/secret2", 1);

        let events = collect(&mock, Path::new("/r"), "secret", &SearchOptions::default());
        assert!(matched_paths(&events).is_empty());

        let options = SearchOptions {
            include_hidden: true,
            ..SearchOptions::default()
        };
        let events = collect(&mock, Path::new("/r"), "secret", &options);
        assert_eq!(
            matched_paths(&events),
            [PathBuf::from("/r/.secret"), PathBuf::from("/r/.cache/secret2")]
        );
    }

    #[test]
    fn unreadable_and_vanished_dirs_count_as_empty() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_dir("/r/locked");
        mock.add_file("/r/locked/x", 1);
        mock.deny("/r/locked");
        mock.add_dir("/r/z");
        mock.add_file("/r/z/x", 1);

        let events = collect(&mock, Path::new("/r"), "x", &SearchOptions::default());

        assert!(!events.iter().any(|e| matches!(e, SearchEvent::Error { .. })));
        assert_eq!(matched_paths(&events), [PathBuf::from("/r/z/x")]);
    }

    #[test]
    fn traversal_error_is_reported_once_with_directory() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_dir("/r/a");
        mock.add_dir("/r/a/broken");
        mock.add_dir("/r/b");
        mock.add_file("/r/b/x", 1);
        mock.fail("/r/a/broken", ErrorKind::Other);

        let events = collect(&mock, Path::new("/r"), "x", &SearchOptions::default());

        let errors: Vec<&SearchEvent> = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            SearchEvent::Error { directory, .. } if directory == Path::new("/r/a/broken")
        ));
        // The walk unwinds; later siblings are not visited.
        assert!(matched_paths(&events).is_empty());
        assert!(ends_with_terminal(&events));
    }

    #[tokio::test]
    async fn rejects_bad_parameters() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut worker = SearchWorker::new(Arc::new(MockFileSystem::default()), SearchOptions::default(), tx);

        assert!(matches!(
            worker.start_search(Path::new(""), "x"),
            Err(AppError::BadSearchParameters)
        ));
        assert!(matches!(
            worker.start_search(Path::new("/r"), ""),
            Err(AppError::BadSearchParameters)
        ));
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn second_search_is_rejected_while_running() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_file("/r/x", 1);
        let gate = mock.hold_reads();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut worker = SearchWorker::new(Arc::new(mock), SearchOptions::default(), tx);

        let task_id = worker.start_search(Path::new("/r"), "x").unwrap();
        let err = worker.start_search(Path::new("/r"), "x").unwrap_err();
        assert_eq!(err.to_string(), "Search already in progress");

        drop(gate);
        let events = until_done(&mut rx).await;
        assert_eq!(matched_paths(&events), [PathBuf::from("/r/x")]);
        assert!(!worker.is_running());

        let next = worker.start_search(Path::new("/r"), "x").unwrap();
        assert!(next > task_id);
    }

    #[tokio::test]
    async fn cancelled_search_still_terminates() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_file("/r/x1", 1);
        mock.add_file("/r/x2", 1);
        let gate = mock.hold_reads();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut worker = SearchWorker::new(Arc::new(mock), SearchOptions::default(), tx);

        worker.start_search(Path::new("/r"), "x").unwrap();
        worker.cancel();
        drop(gate);

        let events = until_done(&mut rx).await;
        assert!(matched_paths(&events).is_empty());
        assert!(ends_with_terminal(&events));
        worker.cancel_and_wait().await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn panicking_search_leaves_worker_startable() {
        let mock = MockFileSystem::default();
        mock.add_dir("/r");
        mock.add_file("/r/x", 1);
        mock.panic_on("/r");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut worker = SearchWorker::new(Arc::new(mock), SearchOptions::default(), tx);

        worker.start_search(Path::new("/r"), "x").unwrap();
        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            while worker.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(settled.is_ok());

        worker.start_search(Path::new("/r"), "x").unwrap();
        let events = until_done(&mut rx).await;
        assert_eq!(matched_paths(&events), [PathBuf::from("/r/x")]);
    }
}
