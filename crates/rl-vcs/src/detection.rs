use crate::backend::VcsError;
use std::path::{Path, PathBuf};

/// Finds the working-tree root of the git repository containing `path`.
pub fn discover_root(path: &Path) -> Result<PathBuf, VcsError> {
    let repo = gix::discover(path).map_err(|err| {
        tracing::debug!(path = %path.display(), error = %err, "git discovery failed");
        VcsError::RepoNotFound
    })?;
    let workdir = repo.workdir().ok_or(VcsError::RepoNotFound)?;
    workdir.canonicalize().map_err(|_| VcsError::RepoNotFound)
}
