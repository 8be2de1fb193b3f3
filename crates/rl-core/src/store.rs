use crate::error::{RedlineError, ReviewError, StoreError};
use crate::migration::{decode, Decoded};
use crate::persist::{DocumentFile, VersionStamp};
use crate::types::{
    Comment, CommentId, CommentKind, CommentPatch, CommentStatus, DocumentStatus, NewComment,
    Patch, ReviewDocument, Summary, ThreadAuthor, ThreadEntry,
};
use crate::validation::{validate_comment_patch, validate_new_comment, validate_summary};
use chrono::Utc;
use rl_events::{FileWatch, WatchError};
use rl_vcs::backend::HEAD;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

type Written = Arc<Mutex<Option<VersionStamp>>>;

fn last_written(written: &Written) -> Option<VersionStamp> {
    *written.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Branch seen by the watch callback; follows `switch_branch_if_needed`.
type WatchedBranch = Arc<Mutex<String>>;

/// Where the document lives and which review it belongs to.
struct Backing {
    file: DocumentFile,
    base_ref: String,
    branch: String,
    /// Stamp of the most recent write made by this store.
    written: Written,
}

impl Backing {
    fn commit(&self, document: &ReviewDocument) -> Result<VersionStamp, StoreError> {
        let stamp = self.file.write(document)?;
        *self.written.lock().unwrap_or_else(PoisonError::into_inner) = Some(stamp);
        Ok(stamp)
    }

    fn fresh(&self) -> Result<(ReviewDocument, VersionStamp), StoreError> {
        let document = ReviewDocument::empty(&self.base_ref, &self.branch);
        let stamp = self.commit(&document)?;
        Ok((document, stamp))
    }

    fn is_branch_switch(&self, decoded: &Decoded) -> bool {
        !decoded.adopted_branch && decoded.document.branch != self.branch && self.branch != HEAD
    }

    /// Bring the on-disk document into a usable state and return it.
    ///
    /// Corrupt documents and documents from another branch are renamed aside
    /// and replaced with an empty one. `previous` is kept instead of
    /// overwriting a corrupt file that could not be backed up.
    fn load(
        &self,
        previous: Option<&ReviewDocument>,
    ) -> Result<(ReviewDocument, VersionStamp), StoreError> {
        let path = self.file.path().display().to_string();
        let Some((bytes, stamp)) = self.file.read()? else {
            info!(path = %path, branch = %self.branch, "creating review document");
            return self.fresh();
        };

        match decode(&bytes, &self.branch) {
            Ok(decoded) if self.is_branch_switch(&decoded) => {
                let old_branch = decoded.document.branch;
                let backup = self.file.backup(Some(old_branch.as_str()))?;
                warn!(
                    from = %old_branch,
                    to = %self.branch,
                    backup = %backup.display(),
                    "branch changed; starting a fresh review document"
                );
                self.fresh()
            }
            Ok(decoded) if decoded.changed => {
                if decoded.adopted_branch {
                    info!(path = %path, branch = %self.branch, "adopting current branch for review document");
                } else {
                    info!(path = %path, "upgrading review document schema");
                }
                let stamp = self.commit(&decoded.document)?;
                Ok((decoded.document, stamp))
            }
            Ok(decoded) => Ok((decoded.document, stamp)),
            Err(err) => {
                warn!(path = %path, error = %err, "review document is corrupt");
                match self.file.backup(None) {
                    Ok(backup) => {
                        warn!(backup = %backup.display(), "moved corrupt review document aside");
                        self.fresh()
                    }
                    Err(backup_err) => {
                        warn!(error = %backup_err, "failed to back up corrupt review document");
                        match previous {
                            Some(previous) => Ok((previous.clone(), stamp)),
                            None => self.fresh(),
                        }
                    }
                }
            }
        }
    }
}

/// Owner of the persisted review document.
///
/// The file on disk is authoritative: every operation first checks the
/// file's version stamp and reloads when another process has written it.
/// Writes are last-writer-wins; no lock is taken.
pub struct DocumentStore {
    backing: Backing,
    document: ReviewDocument,
    stamp: Option<VersionStamp>,
    watch: Option<FileWatch>,
    watched_branch: WatchedBranch,
    debounce: Duration,
}

impl DocumentStore {
    pub fn open(
        path: impl Into<PathBuf>,
        base_ref: impl Into<String>,
        branch: impl Into<String>,
        debounce: Duration,
    ) -> Result<Self, RedlineError> {
        let backing = Backing {
            file: DocumentFile::new(path),
            base_ref: base_ref.into(),
            branch: branch.into(),
            written: Arc::new(Mutex::new(None)),
        };
        backing.file.ensure_dir()?;
        let (document, stamp) = backing.load(None)?;
        let watched_branch = Arc::new(Mutex::new(backing.branch.clone()));
        Ok(Self {
            backing,
            document,
            stamp: Some(stamp),
            watch: None,
            watched_branch,
            debounce,
        })
    }

    pub fn path(&self) -> &Path {
        self.backing.file.path()
    }

    pub fn branch(&self) -> &str {
        &self.backing.branch
    }

    pub fn base_ref(&self) -> &str {
        &self.backing.base_ref
    }

    /// Reload from disk if the file changed since it was last seen.
    pub fn refresh(&mut self) -> Result<(), RedlineError> {
        let current = self.backing.file.stamp()?;
        if current.is_some() && current == self.stamp {
            return Ok(());
        }
        debug!(path = %self.path().display(), "review document changed on disk; reloading");
        self.reload()
    }

    fn reload(&mut self) -> Result<(), RedlineError> {
        let (document, stamp) = self.backing.load(Some(&self.document))?;
        self.document = document;
        self.stamp = Some(stamp);
        Ok(())
    }

    /// Apply `f` to a fresh copy of the document and persist the result.
    ///
    /// The in-memory document is replaced only after the write succeeded.
    pub fn with_fresh_state<T, F>(&mut self, f: F) -> Result<T, RedlineError>
    where
        F: FnOnce(&mut ReviewDocument) -> Result<T, RedlineError>,
    {
        self.refresh()?;
        let mut next = self.document.clone();
        let value = f(&mut next)?;
        let stamp = self.backing.commit(&next)?;
        self.document = next;
        self.stamp = Some(stamp);
        Ok(value)
    }

    pub fn get_data(&mut self) -> Result<ReviewDocument, RedlineError> {
        self.refresh()?;
        Ok(self.document.clone())
    }

    /// The cached document, without checking the disk.
    pub fn snapshot(&self) -> ReviewDocument {
        self.document.clone()
    }

    pub fn add_comment(&mut self, input: NewComment) -> Result<ReviewDocument, RedlineError> {
        validate_new_comment(&input)?;
        self.with_fresh_state(|doc| {
            let id = loop {
                let id = CommentId::generate();
                if doc.comment(&id).is_none() {
                    break id;
                }
            };
            let now = Utc::now();
            doc.comments.push(Comment {
                id,
                kind: CommentKind::Comment,
                file: input.file,
                line: input.line,
                end_line: input.end_line,
                side: input.side,
                body: input.body,
                status: CommentStatus::Pending,
                response: None,
                thread: Vec::new(),
                created_at: now,
                resolved_at: None,
            });
            doc.submitted_at.get_or_insert(now);
            doc.status = DocumentStatus::Submitted;
            Ok(doc.clone())
        })
    }

    pub fn update_comment(
        &mut self,
        id: &CommentId,
        patch: CommentPatch,
    ) -> Result<Comment, RedlineError> {
        validate_comment_patch(&patch)?;
        self.with_fresh_state(|doc| {
            let comment = doc.comment_mut(id).ok_or_else(|| ReviewError::CommentNotFound {
                id: id.to_string(),
            })?;
            let now = Utc::now();
            if let Patch::Set(reply) = patch.reply {
                comment.thread.push(ThreadEntry {
                    author: ThreadAuthor::User,
                    body: reply,
                    created_at: Some(now),
                });
                comment.status = CommentStatus::Pending;
            }
            if let Patch::Set(status) = patch.status {
                comment.status = status;
            }
            if let Patch::Set(body) = patch.body {
                comment.body = body;
            }
            if let Patch::Set(resolved_at) = patch.resolved_at {
                comment.resolved_at = resolved_at;
            }
            if comment.status == CommentStatus::Resolved && comment.resolved_at.is_none() {
                comment.resolved_at = Some(now);
            }
            let updated = comment.clone();
            doc.recompute_status();
            Ok(updated)
        })
    }

    pub fn delete_comment(&mut self, id: &CommentId) -> Result<(), RedlineError> {
        self.with_fresh_state(|doc| {
            let index = doc
                .comments
                .iter()
                .position(|c| &c.id == id)
                .ok_or_else(|| ReviewError::CommentNotFound {
                    id: id.to_string(),
                })?;
            doc.comments.remove(index);
            doc.recompute_status();
            Ok(())
        })
    }

    pub fn set_summary(&mut self, summary: Summary) -> Result<ReviewDocument, RedlineError> {
        validate_summary(&summary)?;
        self.with_fresh_state(|doc| {
            doc.summary = Some(summary);
            Ok(doc.clone())
        })
    }

    /// Track `branch` from now on, backing up the document if it belongs to
    /// another branch. Detached HEAD is ignored.
    pub fn switch_branch_if_needed(&mut self, branch: &str) -> Result<bool, RedlineError> {
        if branch == HEAD || branch == self.backing.branch {
            return Ok(false);
        }
        info!(from = %self.backing.branch, to = %branch, "checked out a different branch");
        self.backing.branch = branch.to_string();
        *self
            .watched_branch
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = branch.to_string();
        self.reload()?;
        Ok(true)
    }

    /// Invoke `on_change` with the decoded document whenever another process
    /// rewrites the file. Replaces any previous watch.
    pub fn watch<F>(&mut self, mut on_change: F) -> Result<(), WatchError>
    where
        F: FnMut(ReviewDocument) + Send + 'static,
    {
        self.unwatch();
        let file = self.backing.file.clone();
        let written = Arc::clone(&self.backing.written);
        let watched_branch = Arc::clone(&self.watched_branch);
        let target = [file.path().to_path_buf()];
        let watch = FileWatch::spawn(&target, self.debounce, move |_| {
            let (bytes, stamp) = match file.read() {
                Ok(Some(read)) => read,
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "failed to read review document after change");
                    return;
                }
            };
            if last_written(&written) == Some(stamp) {
                debug!("ignoring change written by this process");
                return;
            }
            let branch = watched_branch
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            match decode(&bytes, &branch) {
                Ok(decoded) => on_change(decoded.document),
                Err(err) => warn!(error = %err, "ignoring unreadable review document change"),
            }
        })?;
        self.watch = Some(watch);
        Ok(())
    }

    pub fn unwatch(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }
}
