//! `TransitServer`: Axum HTTP + `WebSocket` server in front of the relay worker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use transit_core::ConnectionId;
use transit_relay::RelayHandle;

use crate::auth::{self, AllowAll, ConnectionAuthorizer};
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::http::health::{self, HealthResponse};
use crate::http::locations;
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionLimits, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay worker handle.
    pub relay: RelayHandle,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Decides which `WebSocket` upgrades are accepted.
    pub authorizer: Arc<dyn ConnectionAuthorizer>,
    /// Open `WebSocket` connections.
    pub connections: Arc<AtomicUsize>,
}

/// The transit relay server.
pub struct TransitServer {
    config: Arc<ServerConfig>,
    relay: RelayHandle,
    metrics: PrometheusHandle,
    authorizer: Arc<dyn ConnectionAuthorizer>,
    shutdown: Arc<ShutdownCoordinator>,
    connections: Arc<AtomicUsize>,
    start_time: Instant,
}

impl TransitServer {
    /// Create a new server. Accepts every connection until an authorizer is
    /// set with [`Self::with_authorizer`].
    pub fn new(
        config: ServerConfig,
        relay: RelayHandle,
        metrics: PrometheusHandle,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            relay,
            metrics,
            authorizer: Arc::new(AllowAll),
            shutdown,
            connections: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Replace the connection authorizer.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn ConnectionAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            authorizer: self.authorizer.clone(),
            connections: self.connections.clone(),
        };

        let api = Router::new()
            .route("/locations/live", get(locations::live_all))
            .route("/locations/live/route/{route_id}", get(locations::live_route))
            .route("/locations/nearest", post(locations::nearest))
            .route("/locations/eta", post(locations::eta));

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .nest("/api", api)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&self.config.cors_origins))
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(addr = %local_addr, "transit relay listening");
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open `WebSocket` connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

/// Holds one slot of the connection limit until dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(counter.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Query parameters accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Bearer token, for clients that cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = auth::presented_token(params.token.as_deref(), &headers);
    if !state.authorizer.authorize(token) {
        counter!(WS_REJECTED_TOTAL, "reason" => "unauthorized").increment(1);
        warn!("rejected unauthorized websocket upgrade");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if state.shutdown.is_shutting_down() {
        counter!(WS_REJECTED_TOTAL, "reason" => "shutting_down").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        warn!(max = state.config.max_connections, "connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let limits = SessionLimits::from_config(&state.config);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            run_ws_session(
                socket,
                ConnectionId::new(),
                state.relay,
                limits,
                state.shutdown.token(),
            )
            .await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.relay.stats().await.ok();
    let connections = state.connections.load(Ordering::Relaxed);
    Json(health::health_check(state.start_time, connections, stats))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use transit_relay::history::NoopHistorySink;
    use transit_relay::{ClientConnection, RelayConfig, RelayWorker};

    use crate::auth::SharedTokenAuthorizer;

    fn make_server_with(config: ServerConfig) -> (TransitServer, CancellationToken) {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let cancel = shutdown.token();
        let (relay, _worker) =
            RelayWorker::spawn(RelayConfig::default(), Arc::new(NoopHistorySink), cancel.clone());
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        (TransitServer::new(config, relay, metrics, shutdown), cancel)
    }

    fn make_server() -> (TransitServer, CancellationToken) {
        make_server_with(ServerConfig::default())
    }

    async fn seed_vehicle(server: &TransitServer, vehicle: &str, lat: f64, lon: f64) {
        let (tx, _rx) = mpsc::channel(16);
        let conn = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
        let operator = format!("op-{vehicle}");
        let start = json!({
            "type": "start-sharing",
            "data": {"operator_id": operator, "route_id": "R1", "vehicle_id": vehicle}
        });
        let update = json!({
            "type": "location-update",
            "data": {
                "operator_id": operator, "vehicle_id": vehicle, "route_id": "R1",
                "latitude": lat, "longitude": lon,
                "timestamp": "2025-01-01T00:00:00Z"
            }
        });
        server.relay.submit_frame(conn.clone(), start.to_string()).await.unwrap();
        server.relay.submit_frame(conn, update.to_string()).await.unwrap();
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (server, _cancel) = make_server();
        let resp = server.router().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["active_sessions"], 0);
        assert!(parsed["active_routes"].is_number());
    }

    #[tokio::test]
    async fn health_degraded_after_relay_stops() {
        let (server, cancel) = make_server();
        cancel.cancel();
        while !server.relay.is_closed() {
            tokio::task::yield_now().await;
        }
        let resp = server.router().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(body_json(resp).await["status"], "degraded");
    }

    #[tokio::test]
    async fn metrics_endpoint_is_text() {
        let (server, _cancel) = make_server();
        let resp = server.router().oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (server, _cancel) = make_server();
        let resp = server.router().oneshot(get_req("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_client_error() {
        let (server, _cancel) = make_server();
        let resp = server.router().oneshot(get_req("/ws")).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn live_lists_empty_relay() {
        let (server, _cancel) = make_server();
        let resp = server
            .router()
            .oneshot(get_req("/api/locations/live"))
            .await
            .unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["count"], 0);
        assert_eq!(parsed["data"], json!([]));
    }

    #[tokio::test]
    async fn live_route_lists_vehicles() {
        let (server, _cancel) = make_server();
        seed_vehicle(&server, "V1", 14.6000, 121.0000).await;
        seed_vehicle(&server, "V2", 14.6100, 121.0000).await;

        let resp = server
            .router()
            .oneshot(get_req("/api/locations/live/route/R1"))
            .await
            .unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["data"][0]["vehicle_id"], "V1");

        let resp = server
            .router()
            .oneshot(get_req("/api/locations/live/route/R9"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["count"], 0);
    }

    #[tokio::test]
    async fn nearest_ranks_by_distance() {
        let (server, _cancel) = make_server();
        seed_vehicle(&server, "FAR", 14.7000, 121.0000).await;
        seed_vehicle(&server, "NEAR", 14.6010, 121.0000).await;

        let req = post_json(
            "/api/locations/nearest",
            &json!({"latitude": 14.6, "longitude": 121.0, "limit": 1}),
        );
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["data"][0]["vehicle_id"], "NEAR");
        assert_eq!(parsed["data"][0]["proximity"], "approaching");
    }

    #[tokio::test]
    async fn nearest_rejects_bad_coordinates() {
        let (server, _cancel) = make_server();
        let req = post_json(
            "/api/locations/nearest",
            &json!({"latitude": 95.0, "longitude": 121.0}),
        );
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["success"], false);
        assert!(parsed["error"].is_string());
    }

    #[tokio::test]
    async fn nearest_rejects_malformed_body() {
        let (server, _cancel) = make_server();
        let req = post_json("/api/locations/nearest", &json!({"latitude": "north"}));
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["success"], false);
    }

    #[tokio::test]
    async fn eta_for_nearest_vehicle() {
        let (server, _cancel) = make_server();
        seed_vehicle(&server, "V1", 14.6100, 121.0000).await;

        let req = post_json(
            "/api/locations/eta",
            &json!({
                "origin": {"latitude": 14.6, "longitude": 121.0},
                "destination": {"latitude": 14.65, "longitude": 121.0},
                "route_id": "R1"
            }),
        );
        let resp = server.router().oneshot(req).await.unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["data"]["eta_minutes"], 3);
        assert_eq!(parsed["data"]["nearest"][0]["vehicle_id"], "V1");
        assert!(parsed["data"].get("message").is_none());
    }

    #[tokio::test]
    async fn eta_without_vehicles_has_message() {
        let (server, _cancel) = make_server();
        let req = post_json(
            "/api/locations/eta",
            &json!({
                "origin": {"latitude": 14.6, "longitude": 121.0},
                "destination": {"latitude": 14.65, "longitude": 121.0}
            }),
        );
        let parsed = body_json(server.router().oneshot(req).await.unwrap()).await;
        assert_eq!(parsed["data"]["eta_minutes"], Value::Null);
        assert_eq!(parsed["data"]["message"], "No active vehicles found");
        assert!(parsed["data"]["distance_km"].as_f64().unwrap() > 5.0);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let (server, _cancel) = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        handle.await.unwrap();
    }

    #[test]
    fn connection_slots_respect_limit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = ConnectionSlot::acquire(&counter, 1);
        assert!(first.is_some());
        assert!(ConnectionSlot::acquire(&counter, 1).is_none());
        drop(first);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert!(ConnectionSlot::acquire(&counter, 1).is_some());
    }

    #[tokio::test]
    async fn authorizer_is_replaceable() {
        let (server, _cancel) = make_server();
        let server = server.with_authorizer(Arc::new(SharedTokenAuthorizer::new(["s3cret"])));
        assert!(!server.authorizer.authorize(None));
        assert!(server.authorizer.authorize(Some("s3cret")));
    }
}
