// src/network/server.rs
// HTTP surface of the responder (axum).

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::constants::{
    HEADER_KEY_UUID, HEADER_NODE_ID, ROUTE_AVAILABILITY, ROUTE_CHALLENGE, ROUTE_KEY_EXCHANGE,
    ROUTE_PUBLIC_KEY,
};
use crate::error::{AdmissionError, ChallengeError, KeyExchangeError};
use crate::events::dispatcher;
use crate::events::model::{LogEvent, LogLevel, NetworkEvent};
use crate::network::message::{
    ErrorBody, HandshakeRequired, KeyExchangeRequest, KeyExchangeResponse,
};
use crate::network::peer::PeerResolver;
use crate::node::FiberNode;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<FiberNode>,
    pub resolver: Arc<dyn PeerResolver>,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(ROUTE_PUBLIC_KEY, get(public_key))
        .route(ROUTE_KEY_EXCHANGE, post(key_exchange))
        .route(ROUTE_CHALLENGE, post(challenge))
        .route(ROUTE_AVAILABILITY, get(availability))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?.to_string();
    log_server_event(LogLevel::Info, "listener_bind", &addr, None);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        log_server_event(LogLevel::Error, "serve_failed", &addr, Some(e.to_string()));
        return Err(e.into());
    }
    log_server_event(LogLevel::Info, "listener_stopped", &addr, None);
    Ok(())
}

fn log_server_event(level: LogLevel, action: &str, addr: &str, detail: Option<String>) {
    let mut meta = dispatcher::meta("server", level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Network(NetworkEvent {
        meta,
        action: action.to_string(),
        addr: Some(addr.to_string()),
        detail,
    }));
}

async fn public_key(State(state): State<AppState>) -> Response {
    match state.node.public_key() {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn key_exchange(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = state.node.admission().check_ready() {
        return e.into_response();
    }
    let req: KeyExchangeRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return KeyExchangeError::Malformed(e.to_string()).into_response(),
    };
    let peer = state.resolver.resolve(&headers, req.peer_id.as_deref());
    match state.node.submit_session_key(peer.as_deref(), &req) {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn challenge(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let peer = state.resolver.resolve(&headers, None);
    let key_id = headers.get(HEADER_KEY_UUID).and_then(|v| v.to_str().ok());
    let node_id = state.node.node_id().to_string();
    match state
        .node
        .submit_challenge(peer.as_deref(), key_id, &body)
        .await
    {
        Ok(reply) => encrypted(StatusCode::OK, reply.ciphertext, reply.key_id, node_id),
        Err(ChallengeError::Inference {
            encrypted_body,
            key_id,
        }) => encrypted(StatusCode::BAD_GATEWAY, encrypted_body, key_id, node_id),
        Err(e) => e.into_response(),
    }
}

async fn availability(State(state): State<AppState>) -> Response {
    let body = state.node.availability();
    let status = if body.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

fn encrypted(status: StatusCode, body: Vec<u8>, key_id: String, node_id: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE.as_str(), OCTET_STREAM.to_string()),
            (HEADER_KEY_UUID, key_id),
            (HEADER_NODE_ID, node_id),
        ],
        body,
    )
        .into_response()
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        error_body(self.status_code(), self.to_string())
    }
}

impl IntoResponse for KeyExchangeError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(KeyExchangeResponse::rejected(self.to_string())),
        )
            .into_response()
    }
}

impl IntoResponse for ChallengeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ChallengeError::RequiresHandshake { public_key } => {
                (status, Json(HandshakeRequired::new(public_key))).into_response()
            }
            ChallengeError::Inference { encrypted_body, .. } => {
                (status, [(header::CONTENT_TYPE, OCTET_STREAM)], encrypted_body).into_response()
            }
            ChallengeError::Admission(e) => e.into_response(),
            ChallengeError::Internal(_) => error_body(status, "internal error".to_string()),
            other => error_body(status, other.to_string()),
        }
    }
}
