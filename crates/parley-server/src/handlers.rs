//! Connection and HTTP handlers for the Parley server.
//!
//! This module wires the room engine to the outside world: the WebSocket
//! session loop (one per connection, driving the engine's state machine)
//! and the small stateless HTTP surface consumed by the presentation layer.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::suggest::SuggestClient;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use parley_core::RoomEngine;
use parley_protocol::{codec, ClientEvent};
use parley_store::MessageStore;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The room broadcast engine.
    pub engine: RoomEngine,
    /// AI suggestion gateway.
    pub suggest: SuggestClient,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the message log is corrupt (fail fast rather than
/// silently starting empty) or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // A corrupt durable store is fatal at startup.
    let store = MessageStore::load(&config.store.path)
        .await
        .context("Failed to load message log")?;

    let suggest = SuggestClient::new(&config.suggest)
        .context("Failed to build suggestion client")?;

    let state = Arc::new(AppState {
        engine: RoomEngine::new(Arc::new(store)),
        suggest,
        config: config.clone(),
    });

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/rooms", get(rooms_handler))
        .route("/api/smart-reply", post(smart_reply_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Configured room listing.
async fn rooms_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "rooms": state.config.rooms.available }))
}

#[derive(Debug, Deserialize)]
struct SmartReplyRequest {
    #[serde(default)]
    text: Option<String>,
}

/// AI reply suggestion proxy.
///
/// Upstream failures never propagate: they are logged and converted to the
/// configured fallback suggestion with a 200 response. The only error case
/// is missing/empty input text.
async fn smart_reply_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SmartReplyRequest>,
) -> impl IntoResponse {
    let text = request.text.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Text is required" })),
        );
    }

    let suggestion = match state.suggest.try_suggest(text).await {
        Ok(suggestion) => {
            metrics::record_suggestion("ok");
            suggestion
        }
        Err(e) => {
            warn!(error = %e, "Suggestion failed, serving fallback");
            metrics::record_suggestion("fallback");
            state.suggest.fallback().to_string()
        }
    };

    (StatusCode::OK, Json(json!({ "suggestion": suggestion })))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
///
/// Events from the engine are queued on an unbounded channel in serialized
/// order and forwarded to the socket here; inbound frames are decoded and
/// dispatched to the engine. Any exit path falls through to the disconnect
/// transition, so roster and typing cleanup happen exactly once.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Generate connection ID
    let connection_id = format!(
        "conn_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );

    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Register with the engine; events for this connection arrive on rx.
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.engine.register(&connection_id, tx);

    loop {
        tokio::select! {
            biased;

            // Forward engine events to the client
            Some(event) = rx.recv() => {
                match codec::encode(&event) {
                    Ok(text) => {
                        metrics::record_event(text.len(), "outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode event");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_event(text.len(), "inbound");
                        match codec::decode_with_limit(&text, state.config.limits.max_message_size) {
                            Ok(event) => dispatch_event(event, &connection_id, &state).await,
                            Err(e) => {
                                // Malformed events are ignored, never fatal.
                                debug!(connection = %connection_id, error = %e, "Ignoring malformed event");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(connection = %connection_id, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: roster and typing state, leave notice to the room.
    state.engine.disconnect(&connection_id);
    metrics::set_active_rooms(state.engine.stats().active_rooms);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Dispatch a decoded client event to the engine.
///
/// Validation failures are logged and dropped without mutating any state;
/// the connection stays up.
async fn dispatch_event(event: ClientEvent, connection_id: &str, state: &Arc<AppState>) {
    match event {
        ClientEvent::Join { display_name, room } => {
            match state.engine.join(connection_id, &display_name, &room) {
                Ok(()) => metrics::set_active_rooms(state.engine.stats().active_rooms),
                Err(e) => debug!(connection = %connection_id, error = %e, "Join rejected"),
            }
        }

        ClientEvent::SendMessage { text } => {
            match state.engine.send(connection_id, &text).await {
                Ok(()) => metrics::record_chat_message(),
                Err(e) => debug!(connection = %connection_id, error = %e, "Message rejected"),
            }
        }

        ClientEvent::Typing => {
            if let Err(e) = state.engine.typing(connection_id) {
                debug!(connection = %connection_id, error = %e, "Typing ignored");
            }
        }

        ClientEvent::StopTyping => {
            if let Err(e) = state.engine.stop_typing(connection_id) {
                debug!(connection = %connection_id, error = %e, "Stop typing ignored");
            }
        }

        ClientEvent::LeaveRoom { .. } => {
            state.engine.leave_room(connection_id);
            metrics::set_active_rooms(state.engine.stats().active_rooms);
        }
    }
}
