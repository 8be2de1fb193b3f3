pub mod document;
pub mod enums;
pub mod ids;
pub mod io;

pub use document::{Comment, ReviewDocument, Summary, TestPlanItem, ThreadEntry};
pub use enums::{CommentKind, CommentStatus, DiffSide, DocumentStatus, ThreadAuthor};
pub use ids::CommentId;
pub use io::{CommentPatch, NewComment, Patch};
