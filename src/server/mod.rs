//! HTTP Server
//!
//! A thin S3 surface over [`ObjectStore`], plus a separate listener for
//! health checks and Prometheus scrapes.
//!
//! Shutdown is driven by [`ServerState::begin_shutdown`]: new S3 requests
//! are answered with `503`, the accept loops stop, and open connections are
//! given a grace period to drain.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::object_layer::ObjectStore;

pub mod handlers;
pub mod metrics;
pub mod response;

pub use metrics::ServerMetrics;
pub use response::ResponseBody;

// =============================================================================
// Server State
// =============================================================================

/// Process-wide server state shared by every connection
pub struct ServerState {
    store: Arc<ObjectStore>,
    metrics: ServerMetrics,
    shutting_down: AtomicBool,
    shutdown: CancellationToken,
    started: Instant,
}

impl ServerState {
    pub fn new(store: Arc<ObjectStore>) -> Result<Self> {
        Ok(Self {
            store,
            metrics: ServerMetrics::new()?,
            shutting_down: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            started: Instant::now(),
        })
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Refuse new requests and stop accepting connections
    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
            self.shutdown.cancel();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Token cancelled by [`ServerState::begin_shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Bind a listener, mapping failures to a configuration error
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))
}

/// Serve the S3 API until shutdown, then drain for at most `grace`
pub async fn serve(state: Arc<ServerState>, listener: TcpListener, grace: Duration) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("S3 API listening on {}", addr);
    }

    let token = state.shutdown_token();
    let mut connections = JoinSet::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("S3 API accept error: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        let token = token.clone();

        connections.spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handlers::handle(state, req).await) }
            });
            let conn = http1::Builder::new().serve_connection(io, service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = token.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!(%peer, "S3 API connection error: {}", e);
            }
        });

        // Reap finished connections
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    info!(open = connections.len(), "Draining connections");

    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!(
            remaining = connections.len(),
            "Grace period elapsed, aborting connections"
        );
        connections.abort_all();
    }

    info!("S3 API stopped");
    Ok(())
}

async fn health_handler(
    state: Arc<ServerState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<ResponseBody>, Infallible> {
    let response = match req.uri().path() {
        "/healthz" | "/livez" => response::text(StatusCode::OK, "ok"),
        "/readyz" => {
            if state.is_shutting_down() {
                response::text(StatusCode::SERVICE_UNAVAILABLE, "shutting down")
            } else {
                response::text(StatusCode::OK, "ok")
            }
        }
        "/metrics" => {
            let cache = state.store().cache_stats();
            match state.metrics().render(cache.as_ref()) {
                Ok((content_type, body)) => {
                    let mut response = response::text(StatusCode::OK, body);
                    response.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        response::header_value(&content_type),
                    );
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    response::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            }
        }
        _ => response::text(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

/// Serve health checks and metrics until shutdown
pub async fn run_health_server(state: Arc<ServerState>, listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Health and metrics listening on {}", addr);
    }

    let token = state.shutdown_token();
    loop {
        let (stream, _) = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Health server accept error: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| health_handler(state.clone(), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Health connection error: {}", e);
            }
        });
    }
    Ok(())
}
