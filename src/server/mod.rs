// HTTP surface for the boundary guards
//
// Routes:
// - GET  /          service banner
// - GET  /user      parameterized user lookup
// - GET  /ping      hostname guard + TCP probe
// - POST /loadjson  payload guard + echo
// - GET  /view      path confinement + file read
// - GET  /run       command authorizer + API key + execution
// - GET  /secret    presence of the API key
// - GET  /health    liveness
// - GET  /metrics   Prometheus scrape endpoint (when enabled)

pub mod handlers;
pub mod response;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::exec::CommandRunner;
use crate::guards::{CommandAuthorizer, PathConfinementGuard, Secret};
use crate::metrics;
use crate::probe::HostProbe;
use crate::store::{SqliteBinder, UserDirectory};

/// Everything a request handler may touch, built once at startup
///
/// All of it is read-only for the lifetime of the process.
pub struct AppState {
    pub authorizer: CommandAuthorizer,
    pub runner: CommandRunner,
    pub files: PathConfinementGuard,
    pub read_timeout: Duration,
    pub probe: HostProbe,
    pub users: UserDirectory,
    pub api_key: Secret,
    pub max_body_bytes: usize,
    pub metrics_enabled: bool,
}

impl AppState {
    /// Build state from validated configuration
    ///
    /// The upload directory must already exist; the database file is opened
    /// per request, not here.
    pub fn from_config(config: &Config) -> Result<Self> {
        let table = config.command_table()?;
        let files = PathConfinementGuard::new(&config.files.upload_dir).with_context(|| {
            format!(
                "Failed to open upload directory {:?}",
                config.files.upload_dir
            )
        })?;
        let binder = SqliteBinder::new(
            config.database.path.clone(),
            Deadline::from_millis(config.database.query_timeout_ms),
        );

        Ok(Self {
            authorizer: CommandAuthorizer::new(Arc::new(table)),
            runner: CommandRunner::new(config.runner_config()),
            files,
            read_timeout: config.read_timeout(),
            probe: HostProbe::new(
                config.probe.port,
                Deadline::from_millis(config.probe.timeout_ms),
            ),
            users: UserDirectory::new(Arc::new(binder)),
            api_key: config.api_key.clone(),
            max_body_bytes: config.payload.max_body_bytes,
            metrics_enabled: config.metrics.enabled,
        })
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/user", get(handlers::user))
        .route("/ping", get(handlers::ping))
        .route("/loadjson", post(handlers::load_json))
        .route("/view", get(handlers::view))
        .route("/run", get(handlers::run))
        .route("/secret", get(handlers::secret))
        .route("/health", get(health_handler));

    if state.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app = app.layer(
        ServiceBuilder::new()
            // Query strings are caller-controlled and stay out of the span
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                info_span!(
                    "request",
                    id = %Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .layer(middleware::from_fn(track_responses))
            .layer(DefaultBodyLimit::max(state.max_body_bytes)),
    );

    app.with_state(state)
}

/// Start the HTTP server and run until it fails
pub async fn serve(config: &Config, state: Arc<AppState>) -> Result<()> {
    if state.metrics_enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let ip = config
        .server
        .bind
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid bind address {:?}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);

    info!("Starting warden on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind server")?;

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}

/// Count responses by route template and status
async fn track_responses(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_response(&endpoint, response.status().as_u16());
    response
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error gathering metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
