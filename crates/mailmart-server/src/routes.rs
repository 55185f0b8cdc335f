use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use mailmart_bot::Bot;
use mailmart_gateway::connection;
use mailmart_gateway::dispatcher::Dispatcher;
use mailmart_types::api::{HealthResponse, UpdateAccepted};
use mailmart_types::events::Inbound;

use crate::middleware::require_bridge_token;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub bot: Bot,
    pub dispatcher: Dispatcher,
    pub bridge_token: String,
}

pub fn router(state: AppState) -> Router {
    let bridge_routes = Router::new()
        .route("/updates", post(post_update))
        .route("/gateway", get(gateway_ws))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bridge_token));

    Router::new()
        .merge(bridge_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /updates: run one inbound event through the bot and queue its replies.
pub async fn post_update(
    State(state): State<AppState>,
    Json(inbound): Json<Inbound>,
) -> (StatusCode, Json<UpdateAccepted>) {
    let user_id = inbound.user_id;
    let replies = state.bot.handle(inbound).await;
    let queued = state.dispatcher.publish_all(replies);
    debug!("Update from {} produced {} message(s)", user_id, queued);

    (StatusCode::ACCEPTED, Json(UpdateAccepted { queued }))
}

/// GET /gateway: bridge socket receiving every outgoing message.
pub async fn gateway_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let remote = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("bridge")
        .to_string();
    let dispatcher = state.dispatcher.clone();

    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, remote))
}

/// GET /health: liveness check (no auth).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
