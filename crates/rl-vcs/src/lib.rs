pub mod backend;
pub mod detection;
pub mod git;
pub mod parse;
pub mod paths;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use crate::backend::{Diff, DiffChange, DiffChangeKind, DiffFile, DiffHunk, VcsBackend, VcsError};
pub use crate::git::GitBackend;
