use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::AppConfig;
use crate::scheduler::RecheckScheduler;
use crate::utils::error::Result;
use crate::watch_manager::WatchManager;

pub mod handlers;
pub mod responses;

pub use handlers::{health, list_watches, notify, remove_watch, scheduler_stats};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<WatchManager>,
    pub scheduler: Arc<RecheckScheduler>,
    pub config: AppConfig,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/notify", post(notify))
        .route("/watches", get(list_watches).delete(remove_watch))
        .route("/scheduler", get(scheduler_stats))
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn serve<F>(config: &AppConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
