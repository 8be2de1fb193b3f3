use crate::routes::error::map_error;
use crate::AppState;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::StreamExt;
use rl_core::RedlineError;
use rl_events::registry::channel;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

/// Register a viewer and stream its frames until the registry drops it.
pub fn subscribe(state: &AppState) -> Response {
    let (sink, receiver) = channel(state.channel_capacity);
    let Some(id) = state.registry.join(Box::new(sink)) else {
        let err = RedlineError::Internal {
            message: "viewer connection closed during handshake".to_string(),
        };
        return map_error(&err).into_response();
    };
    tracing::debug!(connection = ?id, viewers = state.registry.len(), "viewer connected");

    let stream = ReceiverStream::new(receiver)
        .map(|frame| Ok::<Event, Infallible>(Event::default().event(frame.event).data(frame.data)));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
