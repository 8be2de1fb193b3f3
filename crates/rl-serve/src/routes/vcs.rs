use crate::routes::error::map_error;
use crate::{with_core, AppState};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rl_vcs::Diff;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct DiffQuery {
    /// Base ref; defaults to the configured ref, the merge-base, or `HEAD`.
    #[serde(rename = "ref")]
    pub base_ref: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/diff", get(diff))
        .route("/file", get(file_content))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/diff",
    params(DiffQuery),
    responses((status = 200, body = Diff))
)]
pub(crate) async fn diff(State(state): State<AppState>, Query(query): Query<DiffQuery>) -> Response {
    let result = with_core(&state, move |core| {
        core.vcs().diff(query.base_ref.as_deref())
    })
    .await;
    match result {
        Ok(diff) => Json(diff).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/file",
    params(FileQuery),
    responses(
        (status = 200, body = FileContent),
        (status = 403, body = crate::routes::error::ErrorEnvelope),
        (status = 404, body = crate::routes::error::ErrorEnvelope)
    )
)]
pub(crate) async fn file_content(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Response {
    let path = query.path.clone();
    match with_core(&state, move |core| core.vcs().file_content(&query.path)).await {
        Ok(content) => Json(FileContent { path, content }).into_response(),
        Err(err) => map_error(&err).into_response(),
    }
}
