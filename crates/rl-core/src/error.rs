use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("comment not found: {id}")]
    CommentNotFound { id: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to {action} {path}: {message}")]
    Io {
        action: &'static str,
        path: String,
        message: String,
    },
    #[error("failed to encode review document: {message}")]
    Encode { message: String },
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("repo not found")]
    RepoNotFound,
    #[error("path escapes repository root: {path}")]
    PathTraversal { path: String },
    #[error("file not found: {path}")]
    FileNotFound { path: String },
    #[error("vcs failure: {reason}")]
    Failed { reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl From<rl_vcs::VcsError> for VcsError {
    fn from(value: rl_vcs::VcsError) -> Self {
        match value {
            rl_vcs::VcsError::RepoNotFound => Self::RepoNotFound,
            rl_vcs::VcsError::PathTraversal { path } => Self::PathTraversal { path },
            rl_vcs::VcsError::FileNotFound { path } => Self::FileNotFound { path },
            other @ (rl_vcs::VcsError::Io { .. }
            | rl_vcs::VcsError::CommandFailed { .. }
            | rl_vcs::VcsError::Spawn { .. }
            | rl_vcs::VcsError::Timeout { .. }) => Self::Failed {
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RedlineError {
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Watch(#[from] rl_events::WatchError),
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<rl_vcs::VcsError> for RedlineError {
    fn from(value: rl_vcs::VcsError) -> Self {
        RedlineError::Vcs(VcsError::from(value))
    }
}
