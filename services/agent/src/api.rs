//! HTTP API.

use crate::inbox::{verify_pickup, Inbox, PICKUP_SIGNATURE_HEADER, PICKUP_TIMESTAMP_HEADER};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pairwise::protocol::connection::ReceivedMessage;
use pairwise::{Agent, AgentError, Connection, ProtocolError, RouteRecord, Verkey};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub inbox: Arc<Inbox>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = match &err {
            AgentError::Protocol(protocol) if protocol.is_not_found() => StatusCode::NOT_FOUND,
            AgentError::Protocol(ProtocolError::UnexpectedState { .. }) => StatusCode::CONFLICT,
            AgentError::Protocol(
                ProtocolError::MalformedEnvelope(_)
                | ProtocolError::UnhandledMessageType(_)
                | ProtocolError::InvalidInvitation(_)
                | ProtocolError::InvalidSignature
                | ProtocolError::MissingField(_),
            ) => StatusCode::BAD_REQUEST,
            AgentError::AgencyAlreadyBound | AgentError::NoAgency => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_verkey(value: &str) -> ApiResult<Verkey> {
    value
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid verkey: {value}")))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pairwise-agent",
        "label": state.agent.config().label,
    }))
}

/// Create an invitation as the inviter.
async fn create_invitation(State(state): State<AppState>) -> ApiResult<String> {
    Ok(state.agent.create_invitation_url().await?)
}

/// Accept an invitation URL (or text containing one) as the invitee.
async fn accept_invitation(State(state): State<AppState>, body: String) -> ApiResult<Json<Connection>> {
    Ok(Json(state.agent.accept_invitation_url(&body).await?))
}

/// Inbound packed or plaintext message.
async fn receive_message(State(state): State<AppState>, body: String) -> ApiResult<StatusCode> {
    let payload: Value = serde_json::from_str(&body)
        .map_err(|e| ApiError::bad_request(format!("message is not JSON: {e}")))?;
    state.agent.receive_message(payload).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn list_connections(State(state): State<AppState>) -> Json<Vec<Connection>> {
    Json(state.agent.get_connections())
}

async fn list_routes(State(state): State<AppState>) -> Json<Vec<RouteRecord>> {
    Json(state.agent.get_routes())
}

async fn public_did(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let public = state
        .agent
        .public_did()
        .ok_or_else(|| ApiError::not_found("agent has no public DID"))?;
    Ok(Json(serde_json::to_value(public).map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(verkey): Path<String>,
    body: String,
) -> ApiResult<StatusCode> {
    let verkey = parse_verkey(&verkey)?;
    state.agent.send_message_to_connection(&verkey, &body).await?;
    Ok(StatusCode::OK)
}

async fn connection_messages(
    State(state): State<AppState>,
    Path(verkey): Path<String>,
) -> ApiResult<Json<Vec<ReceivedMessage>>> {
    let verkey = parse_verkey(&verkey)?;
    Ok(Json(state.agent.get_connection(&verkey)?.messages))
}

/// Oldest queued envelope for `verkey`, or 204 when there is none.
///
/// The caller proves it holds `verkey` with the pickup headers.
async fn take_inbox(
    State(state): State<AppState>,
    Path(verkey): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let verkey = parse_verkey(&verkey)?;
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let timestamp = header(PICKUP_TIMESTAMP_HEADER)
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| ApiError::unauthorized("missing pickup timestamp"))?;
    let signature = header(PICKUP_SIGNATURE_HEADER)
        .ok_or_else(|| ApiError::unauthorized("missing pickup signature"))?;
    if !verify_pickup(&verkey, timestamp, signature, chrono::Utc::now().timestamp()) {
        warn!(%verkey, "rejected inbox pickup");
        return Err(ApiError::unauthorized("invalid pickup signature"));
    }

    let Some(envelope) = state.inbox.take(&verkey) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    debug!(%verkey, remaining = state.inbox.len(&verkey), "inbox envelope fetched");
    Ok(Json(envelope).into_response())
}

/// Build the router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/invitation", get(create_invitation).post(accept_invitation))
        .route("/msg", post(receive_message))
        .route("/connections", get(list_connections))
        .route("/routes", get(list_routes))
        .route("/did", get(public_did))
        .route("/api/connections/{verkey}/send-message", post(send_message))
        .route("/api/connections/{verkey}/messages", get(connection_messages))
        .route("/inbox/{verkey}", get(take_inbox))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
