use crate::routes::error::{map_error, map_rejection};
use crate::{with_core, AppState};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use rl_core::types::{ReviewDocument, Summary};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/review", get(get_review))
        .route("/summary", put(set_summary))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/review",
    responses((status = 200, body = ReviewDocument))
)]
pub(crate) async fn get_review(State(state): State<AppState>) -> Response {
    match with_core(&state, |core| core.review().get()).await {
        Ok(document) => Json(document).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/summary",
    request_body = Summary,
    responses((status = 200, body = ReviewDocument))
)]
pub(crate) async fn set_summary(
    State(state): State<AppState>,
    body: Result<Json<Summary>, JsonRejection>,
) -> Response {
    let Json(summary) = match body {
        Ok(body) => body,
        Err(rejection) => return map_rejection(&rejection),
    };
    match with_core(&state, move |core| core.review().set_summary(summary)).await {
        Ok(document) => Json(document).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}
