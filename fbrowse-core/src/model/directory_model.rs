//! src/model/directory_model.rs
//! ============================================================================
//! # `DirectoryModel`: Live Listing of One Directory
//!
//! Owns the rows shown for a directory: the entry snapshots in listing order,
//! each paired with its view state (selection, filter match, pending
//! deletion). Rows change only here, in response to worker events or calls
//! from the presentation side; every change is announced as a
//! [`ModelEvent`].
//!
//! Diff edits from the worker are applied as they arrive. The last complete
//! listing (`baseline`) is replaced only when a read finishes, so a diff
//! abandoned halfway leaves a known-good listing to restore from before the
//! next one starts.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::WatchConfig;
use crate::error::AppError;
use crate::fs::entry_info::{EntryInfo, EntryView};
use crate::fs::filesystem::FileSystem;
use crate::fs::watcher::DirWatcher;
use crate::model::name_filter::NameFilter;
use crate::operators::directory_worker::{DirectoryEvent, DirectoryWorker, ReadMode};
use crate::settings::{SettingsChanged, SettingsProvider};

/// Change notifications for observers of a [`DirectoryModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    RowsInserted(usize),
    RowsRemoved(usize),
    RowChanged(usize),
    /// Every row may have changed.
    Reset,
    FileCount(usize),
    SelectedCount(usize),
    MatchedCount(usize),
    /// Empty when there is no error.
    ErrorMessage(String),
    DirectoryChanged(PathBuf),
    ActiveChanged(bool),
    Busy(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RefreshKind {
    Diff,
    Full,
}

#[derive(Debug, Clone)]
struct Row {
    entry: EntryInfo,
    view: EntryView,
}

/// What woke up [`DirectoryModel::pump`].
enum Wakeup {
    Worker(DirectoryEvent),
    Watch,
    Settings(SettingsChanged),
    Closed,
}

pub struct DirectoryModel {
    dir: PathBuf,
    rows: Vec<Row>,
    /// Last listing a read completed with.
    baseline: Vec<EntryInfo>,
    /// False while `rows` hold diff edits not yet confirmed by `Done`.
    in_sync: bool,

    filter: NameFilter,
    file_count: usize,
    selected_count: usize,
    matched_count: usize,
    error_message: String,

    active: bool,
    busy: bool,
    /// Refresh deferred while inactive.
    pending: Option<RefreshKind>,
    /// Refresh requested while a read was in flight.
    queued: Option<RefreshKind>,
    current_task: Option<u64>,

    worker: DirectoryWorker,
    worker_rx: UnboundedReceiver<DirectoryEvent>,
    watcher: Option<DirWatcher>,
    watch_rx: UnboundedReceiver<()>,
    debounce: Duration,
    settings_rx: Option<broadcast::Receiver<SettingsChanged>>,
    events_tx: UnboundedSender<ModelEvent>,
}

impl DirectoryModel {
    /// New model with no directory, inactive.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        settings: Arc<dyn SettingsProvider>,
        watch: &WatchConfig,
        events_tx: UnboundedSender<ModelEvent>,
    ) -> Self {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();

        let watcher = if watch.enabled {
            match DirWatcher::new(watch_tx) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Filesystem watch unavailable, changes need manual refresh");
                    None
                }
            }
        } else {
            None
        };

        Self {
            dir: PathBuf::new(),
            rows: Vec::new(),
            baseline: Vec::new(),
            in_sync: true,
            filter: NameFilter::default(),
            file_count: 0,
            selected_count: 0,
            matched_count: 0,
            error_message: String::new(),
            active: false,
            busy: false,
            pending: None,
            queued: None,
            current_task: None,
            worker: DirectoryWorker::new(fs, settings, worker_tx),
            worker_rx,
            watcher,
            watch_rx,
            debounce: watch.debounce,
            settings_rx: None,
            events_tx,
        }
    }

    /// Re-read when view settings change.
    #[must_use]
    pub fn with_settings_changes(mut self, changes: broadcast::Receiver<SettingsChanged>) -> Self {
        self.settings_rx = Some(changes);
        self
    }

    // ------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&EntryInfo> {
        self.rows.get(index).map(|row| &row.entry)
    }

    #[must_use]
    pub fn view(&self, index: usize) -> Option<EntryView> {
        self.rows.get(index).map(|row| row.view)
    }

    /// Absolute path of the entry at `index`.
    #[must_use]
    pub fn path_at(&self, index: usize) -> Option<&Path> {
        self.rows.get(index).map(|row| row.entry.path.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryInfo, EntryView)> {
        self.rows.iter().map(|row| (&row.entry, row.view))
    }

    #[must_use]
    pub fn selected_paths(&self) -> Vec<PathBuf> {
        if self.selected_count == 0 {
            return Vec::new();
        }
        self.rows
            .iter()
            .filter(|row| row.view.selected)
            .map(|row| row.entry.path.to_path_buf())
            .collect()
    }

    #[must_use]
    pub const fn selected_count(&self) -> usize {
        self.selected_count
    }

    #[must_use]
    pub const fn matched_count(&self) -> usize {
        self.matched_count
    }

    #[must_use]
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    #[must_use]
    pub fn filter_string(&self) -> &str {
        self.filter.pattern()
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy
    }

    #[must_use]
    pub fn parent_path(&self) -> PathBuf {
        clean_path(&self.dir.join(".."))
    }

    /// `name` resolved against the current directory, normalized.
    #[must_use]
    pub fn append_path(&self, name: &str) -> PathBuf {
        clean_path(&self.dir.join(name))
    }

    // ------------------------------------------------------------
    // Directory, activity and refresh
    // ------------------------------------------------------------

    /// Switch to `dir`: move the watch, drop all rows and view state, and
    /// start a full read.
    #[instrument(level = "info", skip(self, dir), fields(path = %dir.as_ref().display()))]
    pub async fn set_directory(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        if dir == self.dir {
            return;
        }

        if let Some(watcher) = self.watcher.as_mut() {
            watcher.unwatch();
            if !dir.as_os_str().is_empty()
                && let Err(e) = watcher.watch(dir)
            {
                warn!(path = %dir.display(), error = %e, "Could not watch directory");
            }
        }

        self.dir = dir.to_path_buf();
        self.pending = None;
        self.read_full().await;
        self.emit(ModelEvent::DirectoryChanged(self.dir.clone()));
    }

    /// While inactive, refreshes are deferred and run on reactivation.
    pub async fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        self.emit(ModelEvent::ActiveChanged(active));

        if active {
            match self.pending.take() {
                Some(RefreshKind::Full) => self.read_full().await,
                Some(RefreshKind::Diff) => self.start_diff_read(),
                None => {}
            }
        }
    }

    /// Diff-mode reload, or mark dirty when inactive.
    pub fn refresh(&mut self) {
        if !self.active {
            self.defer(RefreshKind::Diff);
            return;
        }
        self.start_diff_read();
    }

    /// Full reload after a settings change. A change to the override file
    /// of another directory is ignored.
    pub async fn refresh_full(&mut self, local_path: Option<&Path>) {
        if let Some(local) = local_path
            && local != self.dir
        {
            trace!(local = %local.display(), "Ignoring settings change of another directory");
            return;
        }
        if !self.active {
            self.defer(RefreshKind::Full);
            return;
        }
        self.read_full().await;
    }

    // ------------------------------------------------------------
    // Filter and selection
    // ------------------------------------------------------------

    /// Re-evaluate every row against a new glob-like pattern. Rows that stop
    /// matching are deselected.
    pub fn set_filter_string(&mut self, pattern: &str) {
        self.filter = NameFilter::new(pattern);

        for index in 0..self.rows.len() {
            let matched = self.filter.matches(&self.rows[index].entry.name);
            let view = &mut self.rows[index].view;
            if view.matched != matched || (!matched && view.selected) {
                view.matched = matched;
                if !matched {
                    view.selected = false;
                }
                self.emit(ModelEvent::RowChanged(index));
            }
        }

        self.recount();
    }

    pub fn toggle_selection(&mut self, index: usize) {
        let Some(row) = self.rows.get_mut(index) else {
            return;
        };
        let wanted = !row.view.selected;
        if row.view.set_selected(wanted) {
            self.emit(ModelEvent::RowChanged(index));
            self.recount();
        }
    }

    pub fn clear_selection(&mut self) {
        self.select_where(|_| true, false);
    }

    /// Select every matched row.
    pub fn select_all(&mut self) {
        self.select_where(|_| true, true);
    }

    /// Apply `selected` to matched rows in `first..=last`, bounds in either
    /// order. Out-of-range bounds are ignored.
    pub fn select_range(&mut self, first: usize, last: usize, selected: bool) {
        if first >= self.rows.len() || last >= self.rows.len() {
            return;
        }
        let (first, last) = if first > last { (last, first) } else { (first, last) };
        self.select_where(|index| (first..=last).contains(&index), selected);
    }

    /// Doom every selected row, deselecting it.
    pub fn mark_selected_doomed(&mut self) {
        self.doom_where(|row: &Row| row.view.selected);
    }

    /// Doom the rows whose absolute path is in `paths`.
    pub fn mark_doomed(&mut self, paths: &[PathBuf]) {
        self.doom_where(|row: &Row| paths.iter().any(|p| p.as_path() == row.entry.path.as_path()));
    }

    // ------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------

    /// Wait for and handle one worker, watch or settings event.
    ///
    /// Returns `false` once no source can deliver anything anymore.
    pub async fn pump(&mut self) -> bool {
        let wakeup = tokio::select! {
            Some(event) = self.worker_rx.recv() => Wakeup::Worker(event),
            Some(()) = self.watch_rx.recv() => Wakeup::Watch,
            Some(change) = next_settings_change(&mut self.settings_rx) => Wakeup::Settings(change),
            else => Wakeup::Closed,
        };

        match wakeup {
            Wakeup::Worker(event) => self.handle_worker_event(event),
            Wakeup::Watch => {
                // Coalesce a burst of notifications into one refresh.
                tokio::time::sleep(self.debounce).await;
                while self.watch_rx.try_recv().is_ok() {}
                debug!(path = %self.dir.display(), "Directory changed on disk");
                self.refresh();
            }
            Wakeup::Settings(change) => self.refresh_full(change.local_path.as_deref()).await,
            Wakeup::Closed => return false,
        }
        true
    }

    pub async fn run(&mut self) {
        while self.pump().await {}
    }

    /// Pump until no read is in flight.
    pub async fn wait_until_idle(&mut self) {
        while self.busy {
            if !self.pump().await {
                break;
            }
        }
    }

    // ------------------------------------------------------------
    // Worker plumbing
    // ------------------------------------------------------------

    fn defer(&mut self, kind: RefreshKind) {
        debug!(kind = ?kind, "Model inactive, refresh deferred");
        self.pending = self.pending.max(Some(kind));
    }

    /// Cancel whatever is in flight and start over with a full read.
    async fn read_full(&mut self) {
        self.queued = None;
        if self.current_task.take().is_some() {
            self.worker.cancel_and_wait().await;
        }
        self.start_full_read();
    }

    /// Requires the worker to be idle.
    fn start_full_read(&mut self) {
        self.reset_rows();
        self.set_error(String::new());

        if self.dir.as_os_str().is_empty() {
            self.set_busy(false);
            return;
        }

        match self.worker.start_read_full(&self.dir, "") {
            Ok(task_id) => {
                self.current_task = Some(task_id);
                self.set_busy(true);
            }
            Err(e) => warn!(error = %e, "Could not start directory read"),
        }
    }

    fn start_diff_read(&mut self) {
        if self.current_task.is_some() {
            self.queued = self.queued.max(Some(RefreshKind::Diff));
            return;
        }

        if self.dir.as_os_str().is_empty() {
            self.reset_rows();
            self.set_error(String::new());
            return;
        }

        if !self.in_sync {
            self.restore_baseline();
        }

        match self
            .worker
            .start_read_changed(self.baseline.clone(), &self.dir, "")
        {
            Ok(task_id) => {
                self.current_task = Some(task_id);
                self.set_busy(true);
            }
            Err(e) => warn!(error = %e, "Could not start directory refresh"),
        }
    }

    fn handle_worker_event(&mut self, event: DirectoryEvent) {
        if self.current_task != Some(event.task_id()) {
            trace!(task_id = event.task_id(), "Dropping event of a superseded read");
            return;
        }

        match event {
            DirectoryEvent::Removed { index, entry, .. } => {
                self.in_sync = false;
                if index < self.rows.len() {
                    self.rows.remove(index);
                    self.emit(ModelEvent::RowsRemoved(index));
                } else {
                    warn!(index, name = %entry.name, "Removal outside the listing");
                }
            }
            DirectoryEvent::Inserted { index, entry, .. } => {
                self.in_sync = false;
                let index = index.min(self.rows.len());
                let view = EntryView::matched(self.filter.matches(&entry.name));
                self.rows.insert(index, Row { entry, view });
                self.emit(ModelEvent::RowsInserted(index));
            }
            DirectoryEvent::Done { mode, entries, .. } => self.finish_read(mode, entries),
            DirectoryEvent::Error { error, .. } => self.fail_read(&error),
        }
    }

    fn finish_read(&mut self, mode: ReadMode, entries: Vec<EntryInfo>) {
        match mode {
            ReadMode::Full => {
                self.rows = entries
                    .iter()
                    .map(|entry: &EntryInfo| Row {
                        entry: entry.clone(),
                        view: EntryView::matched(self.filter.matches(&entry.name)),
                    })
                    .collect();
                self.emit(ModelEvent::Reset);
            }
            ReadMode::Diff => {
                let aligned = self.rows.len() == entries.len()
                    && self
                        .rows
                        .iter()
                        .zip(&entries)
                        .all(|(row, entry)| row.entry.same_entry(entry));
                if !aligned {
                    warn!("Rows diverged from the reconciled listing, rebuilding");
                    self.rows = self.rows_carrying_views(&entries);
                    self.emit(ModelEvent::Reset);
                }
            }
        }

        self.baseline = entries;
        self.in_sync = true;
        self.publish_file_count();
        self.recount();
        self.set_error(String::new());

        info!(
            marker = "MODEL_LISTING_READY",
            path = %self.dir.display(),
            mode = ?mode,
            rows = self.rows.len(),
            "Listing updated"
        );
        self.finish_task();
    }

    fn fail_read(&mut self, error: &AppError) {
        if error.is_internal() {
            error!(error = %error, "Directory read hit an internal error");
        }
        self.reset_rows();
        self.set_error(error.user_message());
        self.finish_task();
    }

    fn finish_task(&mut self) {
        self.current_task = None;
        self.set_busy(false);

        match self.queued.take() {
            Some(RefreshKind::Full) => self.start_full_read(),
            Some(RefreshKind::Diff) => self.start_diff_read(),
            None => {}
        }
    }

    /// Put the rows back to the last complete listing, keeping view state
    /// of rows that survive by name.
    fn restore_baseline(&mut self) {
        debug!("Restoring rows from the last complete listing");
        self.rows = self.rows_carrying_views(&self.baseline);
        self.in_sync = true;
        self.emit(ModelEvent::Reset);
        self.publish_file_count();
        self.recount();
    }

    fn rows_carrying_views(&self, entries: &[EntryInfo]) -> Vec<Row> {
        entries
            .iter()
            .map(|entry: &EntryInfo| {
                let matched = self.filter.matches(&entry.name);
                let mut view = self
                    .rows
                    .iter()
                    .find(|row| row.entry.name == entry.name)
                    .map_or_else(EntryView::default, |row| row.view);
                view.matched = matched;
                if !matched {
                    view.selected = false;
                }
                Row {
                    entry: entry.clone(),
                    view,
                }
            })
            .collect()
    }

    fn reset_rows(&mut self) {
        self.rows.clear();
        self.baseline.clear();
        self.in_sync = true;
        self.emit(ModelEvent::Reset);
        self.publish_file_count();
        self.recount();
    }

    // ------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------

    fn select_where<P>(&mut self, in_scope: P, selected: bool)
    where
        P: Fn(usize) -> bool,
    {
        for index in 0..self.rows.len() {
            let view = &mut self.rows[index].view;
            if !in_scope(index) || view.selected == selected {
                continue;
            }
            // Only matched rows are ever selected; deselection applies to all.
            if selected && !view.matched {
                continue;
            }
            if view.set_selected(selected) {
                self.emit(ModelEvent::RowChanged(index));
            }
        }
        self.recount();
    }

    fn doom_where<P>(&mut self, predicate: P)
    where
        P: Fn(&Row) -> bool,
    {
        for index in 0..self.rows.len() {
            if !predicate(&self.rows[index]) {
                continue;
            }
            let view = &mut self.rows[index].view;
            let before = *view;
            view.mark_doomed();
            if *view != before {
                self.emit(ModelEvent::RowChanged(index));
            }
        }
        self.recount();
    }

    /// Recompute selected and matched counts, announcing changes.
    fn recount(&mut self) {
        let selected = self.rows.iter().filter(|row| row.view.selected).count();
        let matched = self.rows.iter().filter(|row| row.view.matched).count();

        if selected != self.selected_count {
            self.selected_count = selected;
            self.emit(ModelEvent::SelectedCount(selected));
        }
        if matched != self.matched_count {
            self.matched_count = matched;
            self.emit(ModelEvent::MatchedCount(matched));
        }
    }

    fn publish_file_count(&mut self) {
        if self.rows.len() != self.file_count {
            self.file_count = self.rows.len();
            self.emit(ModelEvent::FileCount(self.file_count));
        }
    }

    fn set_error(&mut self, message: String) {
        if self.error_message != message {
            self.error_message.clone_from(&message);
            self.emit(ModelEvent::ErrorMessage(message));
        }
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.emit(ModelEvent::Busy(busy));
        }
    }

    fn emit(&self, event: ModelEvent) {
        if self.events_tx.send(event).is_err() {
            trace!("Model event receiver dropped");
        }
    }
}

async fn next_settings_change(
    changes: &mut Option<broadcast::Receiver<SettingsChanged>>,
) -> Option<SettingsChanged> {
    let changes = changes.as_mut()?;
    match changes.recv().await {
        Ok(change) => Some(change),
        Err(RecvError::Lagged(skipped)) => {
            warn!(skipped, "Missed settings notifications, treating as global change");
            Some(SettingsChanged { local_path: None })
        }
        Err(RecvError::Closed) => None,
    }
}

/// Lexically normalize `.` and `..` components. The root's parent is the root.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = out.has_root() && out.parent().is_none();
                if !at_root && !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
