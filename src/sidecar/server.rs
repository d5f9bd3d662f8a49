//! Sidecar server orchestration.
//!
//! Runs the HTTP listener, the shutdown watcher, the refresher and the
//! status logger as one [`TaskGroup`]. The listener, the refresher and an
//! enabled logger tear the whole group down when they exit.

use axum::{middleware, routing::get, Router};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    check_serve_path, log_status, refresh_status, ServerConfig, SharedState, SidecarState, StatusSink,
    StdoutSink,
};
use crate::cli::OutputFormat;
use crate::error::ServerError;
use crate::fpm::StatusSource;
use crate::handlers::{health_handler, metrics_handler, refresh_on_request, status_handler};
use crate::lifecycle::{TaskGroup, Teardown};
use crate::metrics::FpmMetrics;
use crate::state::StatusCell;

/// A bound sidecar, ready to run.
pub struct Server {
    state: SharedState,
    listener: TcpListener,
    local_addr: SocketAddr,
    sink: Arc<dyn StatusSink>,
}

impl Server {
    /// Binds the listener and prepares shared state. Nothing runs until [`Server::run`].
    pub fn bind(config: ServerConfig, source: Arc<dyn StatusSource>) -> Result<Self, ServerError> {
        check_serve_path(&config.path).map_err(ServerError::InvalidPath)?;

        let addr = config.addr;
        let listener = bind_listener(addr)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let state = Arc::new(SidecarState {
            config: Arc::new(config),
            cell: StatusCell::new(),
            metrics: FpmMetrics::new()?,
            source,
            last_pull: Mutex::new(None),
        });

        Ok(Self {
            state,
            listener,
            local_addr,
            sink: Arc::new(StdoutSink),
        })
    }

    /// Replaces the status logger's destination.
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Runs until `token` is cancelled or any member task exits.
    pub async fn run(self, token: CancellationToken) -> Result<(), ServerError> {
        let Server {
            state,
            listener,
            local_addr,
            sink,
        } = self;
        let config = state.config.clone();

        let tls = match &config.tls {
            Some(files) => {
                info!("Loading TLS certificate from: {}", files.cert_path.display());
                info!("Loading TLS private key from: {}", files.key_path.display());
                Some(
                    RustlsConfig::from_pem_file(&files.cert_path, &files.key_path)
                        .await
                        .map_err(ServerError::Tls)?,
                )
            }
            None => None,
        };

        let mut group = TaskGroup::new(&token);
        let handle = Handle::new();
        let app = router(state.clone());

        info!(
            "fpm-metrics-adapter sidecar listening on {}://{}{}",
            if tls.is_some() { "https" } else { "http" },
            local_addr,
            config.path
        );

        let serve_handle = handle.clone();
        group.spawn("listen", Teardown::OnExit, async move {
            let served = match tls {
                Some(tls) => {
                    axum_server::tls_rustls::from_tcp_rustls(listener, tls)
                        .handle(serve_handle)
                        .serve(app.into_make_service())
                        .await
                }
                None => {
                    axum_server::from_tcp(listener)
                        .handle(serve_handle)
                        .serve(app.into_make_service())
                        .await
                }
            };
            served.map_err(ServerError::Serve)
        });

        let shutdown_token = group.token();
        let grace = config.shutdown_grace;
        group.spawn("shutdown", Teardown::Detached, async move {
            shutdown_token.cancelled().await;
            debug!("Shutting down listener, grace period {:?}", grace);
            handle.graceful_shutdown(Some(grace));
            Ok(())
        });

        group.spawn(
            "refresher",
            Teardown::OnExit,
            refresh_status(state.clone(), group.token()),
        );

        let logger_teardown = if config.log_status.enabled {
            Teardown::OnExit
        } else {
            Teardown::Detached
        };
        group.spawn(
            "status-logger",
            logger_teardown,
            log_status(state, sink, group.token()),
        );

        let result = group.wait().await;
        info!("fpm-metrics-adapter sidecar stopped");
        result
    }
}

/// Builds the sidecar's routes for the configured output format.
pub fn router(state: SharedState) -> Router {
    let serve = match state.config.format {
        OutputFormat::Json => get(status_handler),
        OutputFormat::Prometheus => get(metrics_handler).route_layer(
            middleware::from_fn_with_state(state.clone(), refresh_on_request),
        ),
    };

    Router::new()
        .route(&state.config.path, serve)
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Binds a non-blocking std listener so the address is known before serving.
pub(crate) fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ServerError::Bind { addr, source })?;
    Ok(listener)
}
