use crate::registry::ConnectionRegistry;
use crate::types::ReviewEvent;
use crate::watch::{FileWatch, WatchError};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Watches the files in the current diff and tells viewers to re-fetch when
/// any of them changes on disk. It never recomputes the diff itself.
pub struct DiffWatcher {
    registry: ConnectionRegistry,
    debounce: Duration,
    watched: BTreeSet<PathBuf>,
    watch: Option<FileWatch>,
}

impl DiffWatcher {
    pub fn new(registry: ConnectionRegistry, debounce: Duration) -> Self {
        Self {
            registry,
            debounce,
            watched: BTreeSet::new(),
            watch: None,
        }
    }

    /// Replaces the watched set. An unchanged set keeps the running watch.
    pub fn retarget<I>(&mut self, paths: I) -> Result<(), WatchError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let next: BTreeSet<PathBuf> = paths.into_iter().collect();
        if next == self.watched && (self.watch.is_some() || next.is_empty()) {
            return Ok(());
        }

        self.stop();
        if next.is_empty() {
            return Ok(());
        }

        let targets: Vec<PathBuf> = next.iter().cloned().collect();
        let registry = self.registry.clone();
        let watch = FileWatch::spawn(&targets, self.debounce, move |changed| {
            debug!(files = changed.len(), "diffed files changed on disk");
            registry.broadcast(&ReviewEvent::DiffChanged);
        })?;
        self.watch = Some(watch);
        self.watched = next;
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.stop();
        }
        self.watched.clear();
    }

    pub fn watched(&self) -> impl Iterator<Item = &PathBuf> {
        self.watched.iter()
    }
}
