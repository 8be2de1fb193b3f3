pub mod diff_watch;
pub mod registry;
pub mod types;
pub mod watch;

pub use crate::diff_watch::DiffWatcher;
pub use crate::registry::{ConnectionId, ConnectionRegistry, EventSink, SinkError};
pub use crate::types::{Frame, ReviewEvent};
pub use crate::watch::{FileWatch, WatchError};
