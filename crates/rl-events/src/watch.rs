//! Cancellable file-change subscriptions.
//!
//! Parent directories are watched rather than the files themselves, so a
//! writer that replaces a file by renaming a temporary over it is still seen.
//! Raw notifications are funnelled through a channel into one dedicated
//! thread, which coalesces bursts and invokes the handler.

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to start file watcher: {message}")]
    Start { message: String },
}

pub struct FileWatch {
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
}

impl FileWatch {
    /// Starts watching `targets`; `on_change` receives the subset that changed
    /// after each quiet period of `debounce`.
    pub fn spawn<F>(targets: &[PathBuf], debounce: Duration, on_change: F) -> Result<Self, WatchError>
    where
        F: FnMut(Vec<PathBuf>) + Send + 'static,
    {
        let targets: HashSet<PathBuf> = targets.iter().map(|path| normalize(path)).collect();
        let dirs: BTreeSet<PathBuf> = targets
            .iter()
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect();

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|err| WatchError::Start {
            message: err.to_string(),
        })?;

        for dir in &dirs {
            // A directory that does not exist (e.g. a deleted file's folder)
            // simply contributes no events.
            if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                debug!(dir = %dir.display(), error = %err, "directory not watched");
            }
        }

        let worker = std::thread::Builder::new()
            .name("rl-watch".to_string())
            .spawn(move || run_loop(&rx, &targets, debounce, on_change))
            .map_err(|err| WatchError::Start {
                message: err.to_string(),
            })?;

        Ok(Self {
            watcher: Some(watcher),
            worker: Some(worker),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher drops the channel sender, which ends the loop.
        drop(self.watcher.take());
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn normalize(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map_or_else(|_| path.to_path_buf(), |dir| dir.join(name)),
        _ => path.to_path_buf(),
    }
}

fn run_loop<F>(
    rx: &Receiver<notify::Result<Event>>,
    targets: &HashSet<PathBuf>,
    debounce: Duration,
    mut on_change: F,
) where
    F: FnMut(Vec<PathBuf>),
{
    while let Ok(first) = rx.recv() {
        let mut changed = BTreeSet::new();
        collect(first, targets, &mut changed);
        if changed.is_empty() {
            continue;
        }

        let deadline = Instant::now() + debounce;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match rx.recv_timeout(deadline - now) {
                Ok(next) => collect(next, targets, &mut changed),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        on_change(changed.into_iter().collect());
    }
}

fn collect(result: notify::Result<Event>, targets: &HashSet<PathBuf>, changed: &mut BTreeSet<PathBuf>) {
    match result {
        Ok(event) if is_relevant(event.kind) => {
            changed.extend(event.paths.into_iter().filter(|path| targets.contains(path)));
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "file watch error"),
    }
}

fn is_relevant(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Remove(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}
