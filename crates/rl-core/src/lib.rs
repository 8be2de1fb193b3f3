pub mod config;
pub mod error;
pub mod migration;
pub mod persist;
pub mod redline;
pub mod store;
pub mod validation;

pub mod types;

pub use crate::config::Config;
pub use crate::error::RedlineError;
pub use crate::redline::Redline;
pub use crate::store::DocumentStore;
