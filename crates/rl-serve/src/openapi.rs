use utoipa::OpenApi;

use crate::routes::error::ErrorEnvelope;
use crate::routes::vcs::{DiffQuery, FileContent, FileQuery};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rl_core::types::{
    Comment, CommentId, CommentKind, CommentPatch, CommentStatus, DiffSide, DocumentStatus,
    NewComment, ReviewDocument, Summary, TestPlanItem, ThreadAuthor, ThreadEntry,
};
use rl_vcs::{Diff, DiffChange, DiffChangeKind, DiffFile, DiffHunk};

#[derive(OpenApi)]
#[openapi(
    info(title = "redline", description = "Review state shared between a reviewer and a coding agent"),
    paths(
        crate::routes::review::get_review,
        crate::routes::review::set_summary,
        crate::routes::comments::add_comment,
        crate::routes::comments::update_comment,
        crate::routes::comments::delete_comment,
        crate::routes::vcs::diff,
        crate::routes::vcs::file_content,
        crate::routes::events::subscribe
    ),
    components(schemas(
        ReviewDocument,
        Comment,
        ThreadEntry,
        Summary,
        TestPlanItem,
        NewComment,
        CommentPatch,
        CommentId,
        CommentKind,
        CommentStatus,
        DocumentStatus,
        DiffSide,
        ThreadAuthor,
        Diff,
        DiffFile,
        DiffHunk,
        DiffChange,
        DiffChangeKind,
        DiffQuery,
        FileQuery,
        FileContent,
        ErrorEnvelope
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn router() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
