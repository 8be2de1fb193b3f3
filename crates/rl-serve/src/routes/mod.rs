pub mod comments;
pub mod error;
pub mod events;
pub mod review;
pub mod vcs;


use crate::middleware::token::require_token;
use crate::{openapi, AppState};
use axum::middleware;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(review::router(state.clone()))
        .merge(comments::router(state.clone()))
        .merge(vcs::router(state.clone()))
        .merge(events::router(state.clone()))
        .route_layer(middleware::from_fn_with_state(state, require_token));

    let api = Router::new()
        .merge(protected)
        .merge(openapi::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    Router::new().nest("/api", api)
}
