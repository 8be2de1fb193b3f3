pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod sse;

use axum::Router;
use rl_core::{Redline, RedlineError};
use rl_events::ConnectionRegistry;
use rl_vcs::GitBackend;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;

pub type Core = Redline<GitBackend>;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Mutex<Core>>,
    pub registry: ConnectionRegistry,
    pub token: Arc<str>,
    pub channel_capacity: usize,
}

impl AppState {
    pub fn new(core: Core, token: impl Into<Arc<str>>) -> Self {
        let registry = core.registry().clone();
        let channel_capacity = core.config().channel_capacity;
        Self {
            core: Arc::new(Mutex::new(core)),
            registry,
            token: token.into(),
            channel_capacity,
        }
    }

    /// Close every viewer connection and stop the file watches.
    pub async fn shutdown(&self) {
        let result = with_core(self, |core| {
            core.shutdown();
            Ok(())
        })
        .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, "shutdown failed");
        }
    }
}

/// Run `f` against the review service on the blocking pool.
///
/// The service does file and git IO synchronously; handlers take turns on it.
pub async fn with_core<T, F>(state: &AppState, f: F) -> Result<T, RedlineError>
where
    F: FnOnce(&mut Core) -> Result<T, RedlineError> + Send + 'static,
    T: Send + 'static,
{
    let core = Arc::clone(&state.core);
    tokio::task::spawn_blocking(move || {
        let mut core = core.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut core)
    })
    .await
    .map_err(|err| RedlineError::Internal {
        message: err.to_string(),
    })?
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
}

pub async fn serve<S>(
    state: AppState,
    addr: std::net::SocketAddr,
    shutdown: S,
) -> Result<(), std::io::Error>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
