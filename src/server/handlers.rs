//! Request handlers
//!
//! Each handler pulls raw fields out of the request, runs every relevant
//! guard, and only then performs its privileged operation. A rejection
//! returns immediately through `?`.

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::response::{failed, rejected};
use super::AppState;
use crate::error::ApiError;
use crate::guards::{
    CommandAuthorizer, HostnameValidator, PathConfinementGuard, PayloadTypeValidator,
    StructuredValue, ValidationError,
};
use crate::metrics;

/// Header carrying the API key for `/run`
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query string extractor whose rejection is an [`ApiError`]
///
/// Duplicate or undecodable fields get the same JSON error body as every
/// other rejection instead of axum's plain-text one.
pub struct Params<T>(pub T);

impl<T, S> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // The rejection text can quote the query, so it is dropped
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Params(value))
            .map_err(|_| rejected("query", ValidationError::MalformedQuery))
    }
}

#[derive(Debug, Deserialize)]
pub struct UserParams {
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PingParams {
    host: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunParams {
    cmd: Option<String>,
}

/// GET /
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "warden",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/user", "/ping", "/loadjson", "/view", "/run", "/secret", "/health"],
    }))
}

/// GET /user?id=<integer> or GET /user?name=<text>
pub async fn user(
    State(state): State<Arc<AppState>>,
    Params(params): Params<UserParams>,
) -> Result<Response, ApiError> {
    if let Some(raw) = params.id {
        let id: i64 = raw
            .parse()
            .map_err(|_| rejected("user_id", ValidationError::InvalidParameter("id")))?;

        let user = state
            .users
            .find_by_id(id)
            .await
            .map_err(|e| failed("user_lookup", e))?
            .ok_or(ApiError::RecordNotFound)?;
        return Ok(Json(user).into_response());
    }

    if let Some(name) = params.name {
        let users = state
            .users
            .find_by_name(&name)
            .await
            .map_err(|e| failed("user_lookup", e))?;
        return Ok(Json(users).into_response());
    }

    Err(rejected("user_id", ValidationError::MissingParameter("id")))
}

/// GET /ping?host=<host>
pub async fn ping(
    State(state): State<Arc<AppState>>,
    Params(params): Params<PingParams>,
) -> Result<Response, ApiError> {
    let raw = params
        .host
        .ok_or_else(|| rejected("hostname", ValidationError::MissingParameter("host")))?;
    let host = HostnameValidator::validate(&raw).map_err(|e| rejected("hostname", e))?;

    let report = state.probe.probe(&host).await;
    debug!(host = %host, reachable = report.reachable, "Probe finished");
    Ok(Json(report).into_response())
}

/// POST /loadjson
pub async fn load_json(body: Bytes) -> Result<Json<StructuredValue>, ApiError> {
    let value =
        PayloadTypeValidator::decode_and_validate(&body).map_err(|e| rejected("payload", e))?;
    Ok(Json(value))
}

/// GET /view?file=<name>
pub async fn view(
    State(state): State<Arc<AppState>>,
    Params(params): Params<ViewParams>,
) -> Result<Response, ApiError> {
    let requested = params
        .file
        .ok_or_else(|| rejected("path", ValidationError::MissingParameter("file")))?;
    let path = state
        .files
        .resolve(requested)
        .await
        .map_err(|e| rejected("path", e))?;

    let bytes = PathConfinementGuard::read(&path, state.read_timeout)
        .await
        .map_err(|e| failed("file_read", e))?;

    let content_type = if std::str::from_utf8(&bytes).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /run?cmd=<command line> with `X-API-KEY`
///
/// Syntax is checked before the key so malformed input gets the same 400
/// with or without credentials. The whitelist is only consulted for
/// authenticated callers.
pub async fn run(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Params(params): Params<RunParams>,
) -> Result<Response, ApiError> {
    let raw = params
        .cmd
        .ok_or_else(|| rejected("command", ValidationError::MissingParameter("cmd")))?;
    let tokens = CommandAuthorizer::tokenize(&raw).map_err(|e| rejected("command", e))?;

    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !state.api_key.verify(presented) {
        return Err(rejected("api_key", ApiError::Unauthorized));
    }

    let line = state
        .authorizer
        .authorize_tokens(tokens)
        .map_err(|e| rejected("command", e))?;

    let timer = metrics::COMMAND_DURATION_SECONDS.start_timer();
    let result = state.runner.run(&line).await;
    timer.observe_duration();

    match result {
        Ok(output) => {
            let status = if output.success() { "success" } else { "nonzero_exit" };
            metrics::COMMAND_EXECUTIONS_TOTAL
                .with_label_values(&[status])
                .inc();
            info!(program = line.program(), returncode = ?output.returncode, "Command completed");
            Ok(Json(output).into_response())
        }
        Err(e) => {
            metrics::COMMAND_EXECUTIONS_TOTAL
                .with_label_values(&[e.code()])
                .inc();
            Err(failed("command_exec", e))
        }
    }
}

/// GET /secret
pub async fn secret(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "present": state.api_key.is_set() }))
}
