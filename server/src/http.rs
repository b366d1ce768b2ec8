use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::{AppConfig, ConfigError, PAYLOAD_ROUTE},
    render::{self, RenderError},
    upstream::{UpstreamClient, UpstreamError},
};
use platform_seal::SealError;

const ENCRYPTED_DATA_HEADER: HeaderName = HeaderName::from_static("x-encrypted-data");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub upstream: UpstreamClient,
    pub payload_url: Arc<str>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(serve: ServeConfig, config: Arc<AppConfig>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(serve.addr)
        .await
        .with_context(|| format!("failed to bind {}", serve.addr))?;
    let local_addr = listener.local_addr().context("listener has no local address")?;

    let upstream = UpstreamClient::new(config.upstream_timeout)?;
    let payload_url: Arc<str> = config.payload_url(local_addr).into();
    info!(%local_addr, %payload_url, "employee viewer listening");

    let state = AppState {
        config,
        upstream,
        payload_url,
    };
    let router = build_router(state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .allow_methods([Method::GET])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route(PAYLOAD_ROUTE, get(payload_handler))
        .route("/", get(employees_handler))
        .route("/employees", get(employees_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Proxy step: forwards the authenticated call and hands the sealed body back untouched.
async fn payload_handler(State(state): State<AppState>) -> HttpResult<Response> {
    let (api_url, token) = state.config.proxy_target().map_err(HttpError::config)?;
    let relayed = state
        .upstream
        .fetch_encrypted(api_url, token)
        .await
        .map_err(HttpError::upstream)?;
    if !relayed.status.is_success() {
        warn!(status = %relayed.status, "employee API answered with an error status");
    }

    let headers = [
        (header::CONTENT_TYPE, "text/plain"),
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        (header::PRAGMA, "no-cache"),
        (header::EXPIRES, "0"),
    ];
    let mut response = (relayed.status, headers, relayed.body).into_response();
    if let Some(location) = relayed.location {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

/// Render step: fetch the sealed payload, open it and print the table.
async fn employees_handler(State(state): State<AppState>) -> HttpResult<Response> {
    let key = state.config.sealing_key().map_err(HttpError::config)?;
    let encrypted = state
        .upstream
        .fetch_payload(&state.payload_url)
        .await
        .map_err(HttpError::upstream)?;
    let plaintext = platform_seal::open(&encrypted, &key).map_err(HttpError::sealed)?;
    let employees = render::parse_employees(&plaintext).map_err(HttpError::render)?;
    info!(rows = employees.len(), "rendering employee table");

    let mut response = Html(render::render_page(&employees)).into_response();
    match HeaderValue::from_str(encrypted.trim()) {
        Ok(value) => {
            response.headers_mut().insert(ENCRYPTED_DATA_HEADER, value);
        }
        Err(_) => warn!("sealed payload is not a valid header value; omitting echo header"),
    }
    Ok(response)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

type HttpResult<T> = Result<T, HttpError>;

/// Terminates the request with a short plain-text message.
#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn config(err: ConfigError) -> Self {
        error!(error = %err, "configuration error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.summary().to_string(),
        }
    }

    fn upstream(err: UpstreamError) -> Self {
        error!(error = %err, "upstream call failed");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.summary().to_string(),
        }
    }

    fn sealed(err: SealError) -> Self {
        error!(error = %err, "sealed payload rejected");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.summary().to_string(),
        }
    }

    fn render(err: RenderError) -> Self {
        error!(error = %err, "decrypted payload rejected");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };

    info!("shutdown signal received");
}
