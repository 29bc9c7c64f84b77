//! HTTP transport: JSON-RPC over POST plus an SSE push channel.
//!
//! Three routes on a single path:
//!
//! - `POST /mcp` — one JSON-RPC message (or batch) per request body;
//!   responses come back in the HTTP response, notifications get `202`.
//! - `GET /mcp` — a long-lived `text/event-stream` over which the server can
//!   push notifications. Each connection gets a `connected` event first.
//! - `DELETE /mcp` — closes the session named by the `Mcp-Session-Id` header.
//!
//! When API-key authentication is enabled, every route requires a known key
//! in `X-API-Key` (or `Authorization: Bearer`).

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcErrorData, OutgoingNotification};
use crate::mcp::server::McpServer;

/// Outbound capacity per SSE connection before pushes are dropped.
const SSE_CHANNEL_CAPACITY: usize = 32;

/// Registry of live SSE connections.
///
/// Push channels are bounded; a slow consumer loses notifications rather
/// than stalling the broadcaster.
#[derive(Default)]
pub struct SseHub {
    connections: Mutex<HashMap<String, mpsc::Sender<Event>>>,
}

impl SseHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<Event>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, connection_id: String, sender: mpsc::Sender<Event>) {
        self.lock().insert(connection_id, sender);
    }

    fn remove(&self, connection_id: &str) {
        self.lock().remove(connection_id);
    }

    /// Number of live SSE connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Pushes a notification to one connection. Returns whether the
    /// connection exists and accepted it.
    pub fn push(&self, connection_id: &str, notification: &OutgoingNotification) -> bool {
        let Ok(payload) = serde_json::to_string(notification) else {
            return false;
        };

        let connections = self.lock();
        let Some(sender) = connections.get(connection_id) else {
            return false;
        };
        let event = Event::default()
            .id(format!("{}_{}", connection_id, Utc::now().timestamp()))
            .data(payload);
        sender.try_send(event).is_ok()
    }

    /// Pushes a notification to every connection, best effort.
    ///
    /// Returns how many connections accepted it; full or closed channels are
    /// skipped.
    pub fn broadcast(&self, notification: &OutgoingNotification) -> usize {
        let Ok(payload) = serde_json::to_string(notification) else {
            return 0;
        };

        let mut delivered = 0;
        for (connection_id, sender) in self.lock().iter() {
            let event = Event::default()
                .id(format!("{}_{}", connection_id, Utc::now().timestamp()))
                .data(payload.clone());
            if sender.try_send(event).is_ok() {
                delivered += 1;
            } else {
                debug!(connection_id = %connection_id, "dropping push for slow or closed SSE connection");
            }
        }
        delivered
    }
}

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    /// The dispatch core.
    pub server: Arc<McpServer>,
    /// Live SSE connections.
    pub hub: Arc<SseHub>,
}

/// Builds the `/mcp` router. Exposed separately so tests can drive it
/// in-process without a listener.
#[must_use]
pub fn build_router(server: Arc<McpServer>, hub: Arc<SseHub>) -> Router {
    let state = AppState {
        server: Arc::clone(&server),
        hub,
    };

    let mut router = Router::new()
        .route(
            "/mcp",
            post(handle_jsonrpc).get(handle_sse).delete(handle_session_close),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state);

    if let Some(cors) = cors_layer(&server.config().http.cors_origins) {
        router = router.layer(cors);
    }

    router
}

fn cors_layer(origins: &[String]) -> Option<tower_http::cors::CorsLayer> {
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};

    if origins.is_empty() {
        return None;
    }

    let layer = if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(list))
    };

    Some(layer.allow_methods(Any).allow_headers(Any))
}

/// API-key gate for every `/mcp` route. Pass-through when auth is disabled.
async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let auth = &state.server.config().http.auth;
    if !auth.enabled {
        return next.run(request).await;
    }

    let headers = request.headers();
    let presented = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        });

    match presented {
        Some(key) if auth.api_keys.iter().any(|known| known == key) => next.run(request).await,
        _ => unauthorized(),
    }
}

fn unauthorized() -> Response {
    let body = serde_json::to_string(&JsonRpcError::new(
        None,
        JsonRpcErrorData::from_code(ErrorCode::Unauthorized),
    ))
    .unwrap_or_default();

    (
        StatusCode::UNAUTHORIZED,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// `POST /mcp`: one message in, at most one response out.
async fn handle_jsonrpc(State(state): State<AppState>, body: String) -> Response {
    match state.server.handle_message(&body) {
        Some(response) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response,
        )
            .into_response(),
        // Notification-only input: acknowledge without a body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `GET /mcp`: opens the SSE push channel.
async fn handle_sse(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let accepts = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !accepts.contains("text/event-stream") {
        return (
            StatusCode::NOT_ACCEPTABLE,
            "client must accept text/event-stream",
        )
            .into_response();
    }

    let connection_id = format!("sse_{}", Uuid::new_v4());
    let (sender, receiver) = mpsc::channel(SSE_CHANNEL_CAPACITY);
    state.hub.register(connection_id.clone(), sender);
    info!(connection_id = %connection_id, "SSE client connected");

    let connected = Event::default()
        .id(connection_id.clone())
        .event("connected")
        .data(json!({ "connectionId": connection_id }).to_string());

    let stream = ConnectionStream {
        first: Some(connected),
        receiver,
        _guard: HubGuard {
            hub: Arc::clone(&state.hub),
            connection_id,
        },
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
        .into_response()
}

/// `DELETE /mcp`: closes the session named by `Mcp-Session-Id`.
async fn handle_session_close(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(session_id) = headers
        .get("mcp-session-id")
        .and_then(|value| value.to_str().ok())
    else {
        return StatusCode::NOT_FOUND;
    };

    if state.server.close_session(session_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Deregisters the connection when its stream is dropped, however the
/// response ends.
struct HubGuard {
    hub: Arc<SseHub>,
    connection_id: String,
}

impl Drop for HubGuard {
    fn drop(&mut self) {
        self.hub.remove(&self.connection_id);
        info!(connection_id = %self.connection_id, "SSE client disconnected");
    }
}

/// Event stream for one SSE connection: the `connected` event first, then
/// whatever the hub pushes.
struct ConnectionStream {
    first: Option<Event>,
    receiver: mpsc::Receiver<Event>,
    _guard: HubGuard,
}

impl Stream for ConnectionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(event) = this.first.take() {
            return Poll::Ready(Some(Ok(event)));
        }
        this.receiver.poll_recv(cx).map(|event| event.map(Ok))
    }
}

/// Spawns the HTTP listener as a background task.
pub fn spawn(server: Arc<McpServer>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = serve(server, shutdown).await {
            error!(error = %err, "HTTP transport failed");
        }
    })
}

async fn serve(
    server: Arc<McpServer>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let http = &server.config().http;
    let addr = format!("{}:{}", http.host, http.port);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Http {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "HTTP transport listening");

    let hub = Arc::new(SseHub::new());
    let router = build_router(Arc::clone(&server), hub);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(|source| ServerError::Http { addr, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hub_tracks_registration_and_removal() {
        let hub = SseHub::new();
        let (sender, _receiver) = mpsc::channel(1);
        hub.register("sse_1".to_string(), sender);
        assert_eq!(hub.connection_count(), 1);

        hub.remove("sse_1");
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_counts_deliveries_and_skips_full_channels() {
        let hub = SseHub::new();
        let (open_tx, mut open_rx) = mpsc::channel(1);
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx
            .try_send(Event::default().data("occupied"))
            .unwrap();
        hub.register("sse_open".to_string(), open_tx);
        hub.register("sse_full".to_string(), full_tx);

        let notification =
            OutgoingNotification::new("notifications/tools/list_changed", None);
        assert_eq!(hub.broadcast(&notification), 1);
        assert!(open_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn push_targets_one_connection() {
        let hub = SseHub::new();
        let (sender, mut receiver) = mpsc::channel(1);
        hub.register("sse_a".to_string(), sender);

        let notification = OutgoingNotification::new("notifications/ping", None);
        assert!(hub.push("sse_a", &notification));
        assert!(!hub.push("sse_unknown", &notification));
        assert!(receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn broadcast_to_empty_hub_delivers_nothing() {
        let hub = SseHub::new();
        let notification = OutgoingNotification::new("notifications/ping", None);
        assert_eq!(hub.broadcast(&notification), 0);
    }

    #[test]
    fn connection_stream_yields_connected_event_then_waits_for_pushes() {
        let hub = Arc::new(SseHub::new());
        let (sender, receiver) = mpsc::channel(SSE_CHANNEL_CAPACITY);
        hub.register("sse_s".to_string(), sender.clone());

        let mut stream = tokio_test::task::spawn(ConnectionStream {
            first: Some(Event::default().event("connected").data("{}")),
            receiver,
            _guard: HubGuard {
                hub: Arc::clone(&hub),
                connection_id: "sse_s".to_string(),
            },
        });

        // Connected event is ready immediately, then the stream parks until
        // the hub pushes something.
        assert!(tokio_test::assert_ready!(stream.poll_next()).is_some());
        tokio_test::assert_pending!(stream.poll_next());

        sender.try_send(Event::default().data("ping")).unwrap();
        assert!(stream.is_woken());
        assert!(tokio_test::assert_ready!(stream.poll_next()).is_some());
    }

    #[tokio::test]
    async fn guard_drop_deregisters_connection() {
        let hub = Arc::new(SseHub::new());
        let (sender, receiver) = mpsc::channel(1);
        hub.register("sse_x".to_string(), sender);

        let stream = ConnectionStream {
            first: None,
            receiver,
            _guard: HubGuard {
                hub: Arc::clone(&hub),
                connection_id: "sse_x".to_string(),
            },
        };
        assert_eq!(hub.connection_count(), 1);
        drop(stream);
        assert_eq!(hub.connection_count(), 0);
    }
}
