use crate::routes::error::{map_error, map_rejection};
use crate::{with_core, AppState};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{patch, post};
use axum::{Json, Router};
use rl_core::types::{Comment, CommentId, CommentPatch, NewComment, ReviewDocument};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/comments", post(add_comment))
        .route(
            "/comments/{id}",
            patch(update_comment).delete(delete_comment),
        )
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/comments",
    request_body = NewComment,
    responses((status = 200, body = ReviewDocument))
)]
pub(crate) async fn add_comment(
    State(state): State<AppState>,
    body: Result<Json<NewComment>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(body) => body,
        Err(rejection) => return map_rejection(&rejection),
    };
    match with_core(&state, move |core| core.comments().add(input)).await {
        Ok(document) => Json(document).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/api/comments/{id}",
    params(("id" = String, Path, description = "Comment ID")),
    request_body = CommentPatch,
    responses((status = 200, body = Comment))
)]
pub(crate) async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CommentPatch>, JsonRejection>,
) -> Response {
    let Json(patch) = match body {
        Ok(body) => body,
        Err(rejection) => return map_rejection(&rejection),
    };
    let id = CommentId::from(id.as_str());
    match with_core(&state, move |core| core.comments().update(&id, patch)).await {
        Ok(comment) => Json(comment).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = String, Path, description = "Comment ID")),
    responses((status = 204))
)]
pub(crate) async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let id = CommentId::from(id.as_str());
    match with_core(&state, move |core| core.comments().delete(&id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}
