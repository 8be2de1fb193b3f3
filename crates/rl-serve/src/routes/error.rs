use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rl_core::error::{RedlineError, ReviewError, StoreError, VcsError};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
}

pub fn map_error(err: &RedlineError) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code, message) = match err {
        RedlineError::Review(review) => map_review_error(review),
        RedlineError::Store(store) => map_store_error(store),
        RedlineError::Vcs(vcs) => map_vcs_error(vcs),
        RedlineError::Config(_) | RedlineError::Watch(_) | RedlineError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        ),
    };

    if status.is_server_error() {
        tracing::warn!(code, error = %message, "request failed");
    }
    (status, Json(ErrorEnvelope { code, message }))
}

/// Malformed JSON bodies are validation failures like any other.
pub fn map_rejection(rejection: &JsonRejection) -> Response {
    map_error(&RedlineError::Review(ReviewError::InvalidInput {
        message: rejection.body_text(),
    }))
    .into_response()
}

fn map_review_error(err: &ReviewError) -> (StatusCode, &'static str, String) {
    match err {
        ReviewError::CommentNotFound { .. } => {
            (StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        ReviewError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
    }
}

fn map_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::Io { .. } | StoreError::Encode { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            err.to_string(),
        ),
    }
}

fn map_vcs_error(err: &VcsError) -> (StatusCode, &'static str, String) {
    match err {
        VcsError::RepoNotFound | VcsError::FileNotFound { .. } => {
            (StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        VcsError::PathTraversal { .. } => {
            (StatusCode::FORBIDDEN, "path_traversal", err.to_string())
        }
        VcsError::Failed { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "vcs_error",
            err.to_string(),
        ),
    }
}
