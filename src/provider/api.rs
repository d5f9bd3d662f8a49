//! HTTP surface of the custom metrics provider.
//!
//! Serves the provider on the `custom.metrics.k8s.io/v1beta2` URL layout.
//! Only pod metrics exist; a pod name of `*` selects pods by the
//! `labelSelector` query parameter.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{AdapterConfig, MetricValueList, Provider, API_GROUP_VERSION};
use crate::error::{ProviderError, ServerError};
use crate::lifecycle::{TaskGroup, Teardown};
use crate::sidecar::server::bind_listener;

pub const API_PREFIX: &str = "/apis/custom.metrics.k8s.io/v1beta2";

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProviderError::MetricNotFound(_) | ProviderError::ObjectNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ProviderError::InvalidName { .. } => StatusCode::BAD_REQUEST,
            ProviderError::Scrape(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiResource {
    name: String,
    singular_name: &'static str,
    namespaced: bool,
    kind: &'static str,
    verbs: [&'static str; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiResourceList {
    kind: &'static str,
    api_version: &'static str,
    group_version: &'static str,
    resources: Vec<ApiResource>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SelectorQuery {
    #[serde(rename = "labelSelector")]
    pub label_selector: Option<String>,
}

#[instrument(skip(provider))]
async fn list_metrics_handler(State(provider): State<Arc<Provider>>) -> impl IntoResponse {
    let resources = provider
        .list_all_metrics()
        .into_iter()
        .map(|info| ApiResource {
            name: format!("{}/{}", info.group_resource, info.metric),
            singular_name: "",
            namespaced: info.namespaced,
            kind: "MetricValueList",
            verbs: ["get"],
        })
        .collect();

    Json(ApiResourceList {
        kind: "APIResourceList",
        api_version: "v1",
        group_version: API_GROUP_VERSION,
        resources,
    })
}

#[instrument(skip(provider))]
async fn pod_metric_handler(
    State(provider): State<Arc<Provider>>,
    Path((namespace, name, metric)): Path<(String, String, String)>,
    Query(query): Query<SelectorQuery>,
) -> Result<Json<MetricValueList>, ProviderError> {
    let items = if name == "*" {
        let selector = query.label_selector.unwrap_or_default();
        provider
            .get_metric_by_selector(&namespace, &selector, &metric)
            .await?
    } else {
        vec![provider.get_metric_by_name(&namespace, &name, &metric).await?]
    };

    Ok(Json(MetricValueList::new(items)))
}

pub fn router(provider: Arc<Provider>) -> Router {
    Router::new()
        .route(API_PREFIX, get(list_metrics_handler))
        .route(
            &format!("{API_PREFIX}/namespaces/{{namespace}}/pods/{{name}}/{{metric}}"),
            get(pod_metric_handler),
        )
        .route("/healthz", get(|| async { "ok" }))
        .with_state(provider)
}

/// A bound adapter, ready to run.
pub struct AdapterServer {
    config: AdapterConfig,
    provider: Arc<Provider>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl AdapterServer {
    pub fn bind(config: AdapterConfig, provider: Arc<Provider>) -> Result<Self, ServerError> {
        let addr = config.addr;
        let listener = bind_listener(addr)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            config,
            provider,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the listener and the cache janitor until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) -> Result<(), ServerError> {
        let AdapterServer {
            config,
            provider,
            listener,
            local_addr,
        } = self;

        let tls = match &config.tls {
            Some(files) => Some(
                RustlsConfig::from_pem_file(&files.cert_path, &files.key_path)
                    .await
                    .map_err(ServerError::Tls)?,
            ),
            None => None,
        };

        let mut group = TaskGroup::new(&token);
        let handle = Handle::new();
        let app = router(provider.clone());

        info!(
            "fpm-metrics-adapter provider listening on {}://{}",
            if tls.is_some() { "https" } else { "http" },
            local_addr
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

        let janitor_token = group.token();
        group.spawn("cache-janitor", Teardown::OnExit, async move {
            let mut ticker = interval(provider.cache().ttl());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = janitor_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = provider.cache().purge_expired();
                        if purged > 0 {
                            debug!("Purged {} expired cache entries", purged);
                        }
                    }
                }
            }
            Ok(())
        });

        let result = group.wait().await;
        info!("fpm-metrics-adapter provider stopped");
        result
    }
}
