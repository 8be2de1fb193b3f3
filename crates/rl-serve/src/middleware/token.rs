use crate::routes::error::ErrorEnvelope;
use crate::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

pub const TOKEN_HEADER: &str = "x-redline-token";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.trim().to_string())
}

fn presented_token(request: &Request<Body>) -> Option<String> {
    let headers = request.headers();
    bearer(headers)
        .or_else(|| {
            headers
                .get(TOKEN_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        })
        // EventSource cannot set headers.
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(request.uri())
                .ok()
                .and_then(|Query(query)| query.token)
        })
        .filter(|value| !value.is_empty())
}

pub async fn require_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match presented_token(&request) {
        Some(token) if token.as_str() == &*state.token => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorEnvelope {
                code: "unauthorized",
                message: "missing or invalid token".to_string(),
            }),
        )
            .into_response(),
    }
}
