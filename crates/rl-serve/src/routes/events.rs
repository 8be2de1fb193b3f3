use crate::AppState;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(subscribe))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/events",
    responses((status = 200, description = "Server-sent events: connected, document-changed, diff-changed"))
)]
pub(crate) async fn subscribe(State(state): State<AppState>) -> Response {
    crate::sse::subscribe(&state)
}
