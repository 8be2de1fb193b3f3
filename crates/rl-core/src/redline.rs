use crate::config::Config;
use crate::error::{RedlineError, VcsError};
use crate::store::DocumentStore;
use crate::types::{Comment, CommentId, CommentPatch, NewComment, ReviewDocument, Summary};
use rl_events::{ConnectionRegistry, DiffWatcher, ReviewEvent, WatchError};
use rl_vcs::backend::HEAD;
use rl_vcs::{Diff, VcsBackend};
use std::path::Path;
use tracing::{debug, info, warn};

fn document_event(document: &ReviewDocument) -> Option<ReviewEvent> {
    match serde_json::to_value(document) {
        Ok(value) => Some(ReviewEvent::DocumentChanged(value)),
        Err(err) => {
            warn!(error = %err, "failed to encode review document for viewers");
            None
        }
    }
}

/// The review service: document store, diff queries and viewer notifications
/// behind one object.
pub struct Redline<V: VcsBackend> {
    vcs: V,
    store: DocumentStore,
    registry: ConnectionRegistry,
    diff_watch: DiffWatcher,
    config: Config,
    default_ref: String,
}

impl<V: VcsBackend> Redline<V> {
    pub fn open(vcs: V, config: Config, registry: ConnectionRegistry) -> Result<Self, RedlineError> {
        let branch = vcs.current_branch()?;
        let default_ref = match &config.diff_ref {
            Some(diff_ref) => diff_ref.clone(),
            None => vcs
                .merge_base(config.fetch_timeout())
                .unwrap_or_else(|| HEAD.to_string()),
        };
        let path = config.document_path(vcs.root());
        info!(branch = %branch, base_ref = %default_ref, path = %path.display(), "opening review");
        let store = DocumentStore::open(path, &default_ref, branch, config.watch_debounce())?;
        let diff_watch = DiffWatcher::new(registry.clone(), config.watch_debounce());
        Ok(Self {
            vcs,
            store,
            registry,
            diff_watch,
            config,
            default_ref,
        })
    }

    pub fn review(&mut self) -> ReviewApi<'_, V> {
        ReviewApi { core: self }
    }

    pub fn comments(&mut self) -> CommentsApi<'_, V> {
        CommentsApi { core: self }
    }

    pub fn vcs(&mut self) -> VcsApi<'_, V> {
        VcsApi { core: self }
    }

    pub fn root(&self) -> &Path {
        self.vcs.root()
    }

    pub fn default_ref(&self) -> &str {
        &self.default_ref
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Forward external edits of the document file to every viewer.
    pub fn start_watching(&mut self) -> Result<(), WatchError> {
        let registry = self.registry.clone();
        self.store.watch(move |document| {
            if let Some(event) = document_event(&document) {
                let delivered = registry.broadcast(&event);
                debug!(delivered, "review document changed externally");
            }
        })
    }

    /// Stop both watches and end every viewer connection.
    pub fn shutdown(&mut self) {
        self.store.unwatch();
        self.diff_watch.stop();
        self.registry.close_all();
        info!("review service stopped");
    }

    fn publish_document(&self) {
        if let Some(event) = document_event(&self.store.snapshot()) {
            self.registry.broadcast(&event);
        }
    }

    fn with_events<T, F>(&mut self, f: F) -> Result<T, RedlineError>
    where
        F: FnOnce(&mut DocumentStore) -> Result<T, RedlineError>,
    {
        let value = f(&mut self.store)?;
        self.publish_document();
        Ok(value)
    }

    /// Follow a `git checkout` made while the service is running.
    fn sync_branch(&mut self) -> Result<(), RedlineError> {
        match self.vcs.current_branch() {
            Ok(branch) => {
                if self.store.switch_branch_if_needed(&branch)? {
                    self.publish_document();
                }
            }
            Err(err) => debug!(error = %err, "could not resolve current branch"),
        }
        Ok(())
    }
}

pub struct ReviewApi<'a, V: VcsBackend> {
    core: &'a mut Redline<V>,
}

impl<V: VcsBackend> ReviewApi<'_, V> {
    pub fn get(&mut self) -> Result<ReviewDocument, RedlineError> {
        self.core.store.get_data()
    }

    pub fn set_summary(&mut self, summary: Summary) -> Result<ReviewDocument, RedlineError> {
        self.core.with_events(|store| store.set_summary(summary))
    }
}

pub struct CommentsApi<'a, V: VcsBackend> {
    core: &'a mut Redline<V>,
}

impl<V: VcsBackend> CommentsApi<'_, V> {
    pub fn add(&mut self, input: NewComment) -> Result<ReviewDocument, RedlineError> {
        self.core.with_events(|store| store.add_comment(input))
    }

    pub fn update(&mut self, id: &CommentId, patch: CommentPatch) -> Result<Comment, RedlineError> {
        self.core.with_events(|store| store.update_comment(id, patch))
    }

    pub fn delete(&mut self, id: &CommentId) -> Result<(), RedlineError> {
        self.core.with_events(|store| store.delete_comment(id))
    }
}

pub struct VcsApi<'a, V: VcsBackend> {
    core: &'a mut Redline<V>,
}

impl<V: VcsBackend> VcsApi<'_, V> {
    /// Diff against `base_ref`, or the service default when none is given.
    ///
    /// Git failures produce an empty diff. The files in the result become
    /// the new diff-watch set.
    pub fn diff(&mut self, base_ref: Option<&str>) -> Result<Diff, RedlineError> {
        self.core.sync_branch()?;
        let base_ref = base_ref
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(self.core.default_ref.as_str())
            .to_string();

        let diff = match self.core.vcs.diff(&base_ref).map_err(VcsError::from) {
            Ok(diff) => diff,
            Err(VcsError::Failed { reason }) => {
                warn!(base_ref = %base_ref, reason = %reason, "diff failed; returning empty diff");
                Diff::empty(&base_ref)
            }
            Err(err) => return Err(err.into()),
        };

        let root = self.core.vcs.root().to_path_buf();
        let targets = diff.paths().map(|path| root.join(path)).collect::<Vec<_>>();
        if let Err(err) = self.core.diff_watch.retarget(targets) {
            warn!(error = %err, "failed to watch diff files");
        }
        Ok(diff)
    }

    pub fn file_content(&mut self, path: &str) -> Result<String, RedlineError> {
        Ok(self.core.vcs.file_content(path)?)
    }

    pub fn current_branch(&mut self) -> Result<String, RedlineError> {
        Ok(self.core.vcs.current_branch()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReviewError;
    use crate::types::{CommentStatus, DiffSide, DocumentStatus, Patch};
    use rl_events::registry::channel;
    use rl_events::types::{CONNECTED, DIFF_CHANGED, DOCUMENT_CHANGED};
    use rl_events::Frame;
    use rl_vcs::testutil::GitTestRepo;
    use rl_vcs::GitBackend;
    use std::time::Duration;
    use tokio::sync::mpsc::Receiver;

    fn setup() -> (GitTestRepo, Redline<GitBackend>, Receiver<Frame>) {
        let repo = GitTestRepo::new().unwrap();
        repo.write_file("src/lib.rs", "pub fn one() {}\n").unwrap();
        repo.commit("initial").unwrap();

        let registry = ConnectionRegistry::new();
        let (sink, mut rx) = channel(16);
        registry.join(Box::new(sink)).unwrap();
        assert_eq!(rx.try_recv().unwrap().event, CONNECTED);

        let vcs = GitBackend::open(repo.path()).unwrap();
        let config = Config {
            watch_debounce_ms: 50,
            fetch_timeout_secs: 2,
            ..Config::default()
        };
        let core = Redline::open(vcs, config, registry).unwrap();
        (repo, core, rx)
    }

    fn draft() -> NewComment {
        NewComment {
            file: "src/lib.rs".to_string(),
            line: 1,
            end_line: None,
            side: DiffSide::New,
            body: "rename".to_string(),
        }
    }

    #[test]
    fn test_open_defaults_to_head_without_remote() {
        let (repo, core, _rx) = setup();
        assert_eq!(core.default_ref(), HEAD);
        assert!(repo.path().join(".redline/review.json").exists());
        assert_eq!(core.store().branch(), "main");
    }

    #[test]
    fn test_mutations_notify_viewers() {
        let (_repo, mut core, mut rx) = setup();

        let doc = core.comments().add(draft()).unwrap();
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.event, DOCUMENT_CHANGED);
        let sent: ReviewDocument = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(sent, doc);

        let id = doc.comments[0].id.clone();
        let patch = CommentPatch {
            status: Patch::Set(CommentStatus::Resolved),
            ..CommentPatch::default()
        };
        core.comments().update(&id, patch).unwrap();
        assert_eq!(rx.try_recv().unwrap().event, DOCUMENT_CHANGED);
        assert_eq!(core.review().get().unwrap().status, DocumentStatus::Resolved);

        core.comments().delete(&id).unwrap();
        assert_eq!(rx.try_recv().unwrap().event, DOCUMENT_CHANGED);
    }

    #[test]
    fn test_failed_mutation_sends_nothing() {
        let (_repo, mut core, mut rx) = setup();
        let err = core.comments().delete(&CommentId::from("nope")).unwrap_err();
        assert!(matches!(
            err,
            RedlineError::Review(ReviewError::CommentNotFound { .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_diff_and_file_content() {
        let (repo, mut core, _rx) = setup();
        repo.write_file("src/lib.rs", "pub fn one() {}\npub fn two() {}\n")
            .unwrap();

        let diff = core.vcs().diff(None).unwrap();
        assert_eq!(diff.base_ref, HEAD);
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.total_additions, 1);

        let content = core.vcs().file_content("src/lib.rs").unwrap();
        assert!(content.contains("two"));

        assert!(matches!(
            core.vcs().file_content("../../../etc/passwd"),
            Err(RedlineError::Vcs(VcsError::PathTraversal { .. }))
        ));
        assert!(matches!(
            core.vcs().file_content("nope.rs"),
            Err(RedlineError::Vcs(VcsError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_bad_ref_degrades_to_empty_diff() {
        let (_repo, mut core, _rx) = setup();
        let diff = core.vcs().diff(Some("no-such-ref")).unwrap();
        assert_eq!(diff.base_ref, "no-such-ref");
        assert!(diff.files.is_empty());
    }

    #[test]
    fn test_diff_follows_branch_checkout() {
        let (repo, mut core, mut rx) = setup();
        core.comments().add(draft()).unwrap();
        let _ = rx.try_recv();

        repo.git(&["checkout", "-q", "-b", "feature"]).unwrap();
        core.vcs().diff(None).unwrap();

        let doc = core.review().get().unwrap();
        assert_eq!(doc.branch, "feature");
        assert!(doc.comments.is_empty());
        assert_eq!(rx.try_recv().unwrap().event, DOCUMENT_CHANGED);
    }

    #[test]
    fn test_diff_files_are_watched() {
        let (repo, mut core, mut rx) = setup();
        repo.write_file("src/lib.rs", "pub fn changed() {}\n").unwrap();
        core.vcs().diff(None).unwrap();

        std::thread::sleep(Duration::from_millis(100));
        repo.write_file("src/lib.rs", "pub fn changed_again() {}\n")
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let frame = loop {
            if let Ok(frame) = rx.try_recv() {
                break frame;
            }
            assert!(std::time::Instant::now() < deadline, "no diff-changed event");
            std::thread::sleep(Duration::from_millis(20));
        };
        assert_eq!(frame.event, DIFF_CHANGED);

        core.shutdown();
        assert!(core.registry().is_empty());
        assert!(!core.store().is_watching());
    }
}
