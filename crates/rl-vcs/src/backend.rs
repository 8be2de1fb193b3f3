use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Ref value git reports for a detached head, and the ref that selects the
/// uncommitted working-tree diff.
pub const HEAD: &str = "HEAD";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    #[serde(rename = "ref")]
    pub base_ref: String,
    pub files: Vec<DiffFile>,
    pub total_additions: u32,
    pub total_deletions: u32,
}

impl Diff {
    pub fn empty(base_ref: impl Into<String>) -> Self {
        Self {
            base_ref: base_ref.into(),
            ..Self::default()
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.path.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffFile {
    pub from: String,
    pub to: String,
    pub path: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub is_binary: bool,
    pub additions: u32,
    pub deletions: u32,
    pub hunks: Vec<DiffHunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub header: String,
    pub changes: Vec<DiffChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffChange {
    pub kind: DiffChangeKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DiffChangeKind {
    Add,
    Delete,
    Context,
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("repo not found")]
    RepoNotFound,
    #[error("path escapes repository root: {path}")]
    PathTraversal { path: String },
    #[error("file not found: {path}")]
    FileNotFound { path: String },
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("failed to run {command}: {message}")]
    Spawn { command: String, message: String },
    #[error("{command} timed out")]
    Timeout { command: String },
}

pub type VcsResult<T> = Result<T, VcsError>;

/// Read-only queries the review engine needs from version control.
pub trait VcsBackend {
    fn root(&self) -> &Path;
    fn default_branch(&self) -> Option<String>;
    fn merge_base(&self, fetch_timeout: Duration) -> Option<String>;
    fn current_branch(&self) -> VcsResult<String>;
    fn diff(&self, base_ref: &str) -> VcsResult<Diff>;
    fn file_content(&self, path: &str) -> VcsResult<String>;
}
