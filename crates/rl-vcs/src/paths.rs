use crate::backend::VcsError;
use std::path::{Component, Path, PathBuf};

/// A repository-relative path that has been proven to stay inside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainedPath {
    pub absolute: PathBuf,
    pub relative: String,
}

/// Resolves `input` against `root` and rejects anything that lands outside it.
///
/// The check runs on the resolved form, so `a/../../x`, `/etc/passwd` and
/// symlinks pointing out of the tree are all refused. `root` must already be
/// canonical.
pub fn resolve_within(root: &Path, input: &str) -> Result<ContainedPath, VcsError> {
    let traversal = || VcsError::PathTraversal {
        path: input.to_string(),
    };
    if input.trim().is_empty() || input.contains('\0') {
        return Err(traversal());
    }

    let mut resolved = PathBuf::new();
    for component in root.join(input).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(traversal());
                }
            }
        }
    }

    let relative = resolved
        .strip_prefix(root)
        .map_err(|_| traversal())?
        .to_path_buf();
    if relative.as_os_str().is_empty() {
        return Err(traversal());
    }

    // The lexical check cannot see through symlinks.
    if let Ok(canonical) = resolved.canonicalize() {
        if !canonical.starts_with(root) {
            return Err(traversal());
        }
    }

    let relative = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(ContainedPath {
        absolute: resolved,
        relative,
    })
}
