//! The node's inbound HTTP surface: a liveness probe and the endpoint the
//! subscription broker calls back into when a subscribed event fires.
//!
//! Resuming the story at the line that subscribed is out of scope here -
//! story tree execution lives in a collaborator this crate only reaches
//! through the [`story_engine_core::story::Story`] trait. This endpoint's
//! job ends at acknowledging the callback so the broker doesn't retry it.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use story_engine_core::executor::Dispatcher;

/// Shared state handed to every route handler.
#[derive(Clone)]
struct AppState {
    #[allow(dead_code)]
    dispatcher: Arc<Dispatcher>,
    #[allow(dead_code)]
    config: Arc<story_engine_core::config::EngineConfig>,
}

/// Build the node's axum [`Router`].
pub fn router(dispatcher: Arc<Dispatcher>, config: Arc<story_engine_core::config::EngineConfig>) -> Router {
    let state = AppState { dispatcher, config };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/story/event", get(story_event_get).post(story_event_post))
        .with_state(state)
}

/// A minimal router exposed on the metrics port, mirroring the original's
/// separate `prometheus_client.start_http_server(port=prometheus_port)`
/// listener. Metrics collection itself is out of scope for this core; the
/// route exists so the process advertises the surface the spec names.
pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics() -> &'static str {
    "# story-engine-node metrics are not collected by this core\n"
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Query parameters the subscription broker attaches to the callback URL,
/// mirroring the `story`/`block`/`app` fields the subscription manager
/// encoded into the `endpoint` it registered.
#[derive(Debug, Deserialize)]
struct StoryEventQuery {
    story: String,
    block: String,
    app: String,
}

async fn story_event_post(State(_state): State<AppState>, Query(query): Query<StoryEventQuery>, Json(body): Json<Value>) -> StatusCode {
    tracing::info!(
        story = %query.story,
        block = %query.block,
        app = %query.app,
        "received subscribed event"
    );
    let _ = body;
    StatusCode::ACCEPTED
}

async fn story_event_get(State(_state): State<AppState>, Query(query): Query<StoryEventQuery>) -> StatusCode {
    tracing::info!(
        story = %query.story,
        block = %query.block,
        app = %query.app,
        "received subscribed event"
    );
    StatusCode::ACCEPTED
}
