//! src/fs/watcher.rs
//!
//! Change watch for the directory a model shows. Any event that may change
//! the directory's content set is forwarded as a unit signal; callers
//! debounce and refresh.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::AppResult;

pub struct DirWatcher {
    watcher: RecommendedWatcher,
    watched: Option<PathBuf>,
}

impl DirWatcher {
    pub fn new(signal_tx: UnboundedSender<()>) -> AppResult<Self> {
        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // Listing a directory opens it; those reads must not trigger a refresh.
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
                Ok(_) => {
                    let _ = signal_tx.send(());
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            }
        })?;

        Ok(Self {
            watcher,
            watched: None,
        })
    }

    /// Watch `path` non-recursively, replacing any previous watch.
    pub fn watch(&mut self, path: &Path) -> AppResult<()> {
        self.unwatch();
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched = Some(path.to_path_buf());
        info!(path = %path.display(), "Watching directory");
        Ok(())
    }

    pub fn unwatch(&mut self) {
        if let Some(old) = self.watched.take()
            && let Err(e) = self.watcher.unwatch(&old)
        {
            debug!(path = %old.display(), error = %e, "Unwatch failed");
        }
    }

    #[must_use]
    pub fn watched(&self) -> Option<&Path> {
        self.watched.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn created_file_signals() {
        let tmp = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = DirWatcher::new(tx).unwrap();
        watcher.watch(tmp.path()).unwrap();
        assert_eq!(watcher.watched(), Some(tmp.path()));

        fs::write(tmp.path().join("new.txt"), b"x").unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(signal, Ok(Some(()))));
    }

    #[test]
    fn watching_missing_path_fails() {
        let tmp = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = DirWatcher::new(tx).unwrap();

        assert!(watcher.watch(&tmp.path().join("missing")).is_err());
        assert!(watcher.watched().is_none());
    }
}
