//! Custom metrics provider.
//!
//! Answers "what is metric M for pod P" by scraping the pod's sidecar over
//! HTTP. Results are cached per `(namespace, pod, metric)` for a fixed TTL
//! and concurrent misses for one key share a single scrape.

pub mod api;
pub mod cache;
pub mod kube;
pub mod target;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument};

use crate::config::TlsFiles;
use crate::error::{ProviderError, ScrapeError};
use crate::fpm::{Status, METRIC_NAMES};

pub use api::AdapterServer;
pub use cache::{CacheKey, ExpiringCache};
pub use kube::{KubeClient, ObjectSource};
pub use target::{resolve_target, PodTarget, ScrapeTarget};

/// API group and version the provider answers for.
pub const API_GROUP_VERSION: &str = "custom.metrics.k8s.io/v1beta2";

/// Effective adapter configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub addr: SocketAddr,
    pub cache_ttl: Duration,
    pub scrape_timeout: Duration,
    pub shutdown_grace: Duration,
    pub kube_api_url: Option<String>,
    pub kube_token_file: Option<PathBuf>,
    pub kube_ca_file: Option<PathBuf>,
    pub tls: Option<TlsFiles>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub api_version: String,
}

impl ObjectReference {
    pub fn pod(namespace: &str, name: &str) -> Self {
        Self {
            kind: "Pod".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            api_version: "/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricIdentifier {
    pub name: String,
}

/// One metric reading for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub described_object: ObjectReference,
    pub metric: MetricIdentifier,
    pub timestamp: DateTime<Utc>,
    /// Serialized as a Kubernetes quantity string.
    #[serde(serialize_with = "as_quantity")]
    pub value: i64,
}

fn as_quantity<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValueList {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub items: Vec<MetricValue>,
}

impl MetricValueList {
    pub fn new(items: Vec<MetricValue>) -> Self {
        Self {
            kind: "MetricValueList",
            api_version: API_GROUP_VERSION,
            metadata: serde_json::Map::new(),
            items,
        }
    }
}

/// A metric the provider can serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricInfo {
    pub group_resource: &'static str,
    pub metric: &'static str,
    pub namespaced: bool,
}

pub struct Provider {
    objects: Arc<dyn ObjectSource>,
    http: reqwest::Client,
    cache: ExpiringCache<CacheKey, MetricValue>,
}

impl Provider {
    pub fn new(objects: Arc<dyn ObjectSource>, http: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            objects,
            http,
            cache: ExpiringCache::new(cache_ttl),
        }
    }

    pub fn cache(&self) -> &ExpiringCache<CacheKey, MetricValue> {
        &self.cache
    }

    /// Returns `metric` for one pod, from cache when fresh.
    #[instrument(skip(self))]
    pub async fn get_metric_by_name(
        &self,
        namespace: &str,
        name: &str,
        metric: &str,
    ) -> Result<MetricValue, ProviderError> {
        if !METRIC_NAMES.contains(&metric) {
            return Err(ProviderError::MetricNotFound(metric.to_string()));
        }

        let key = CacheKey::new(namespace, name, metric);
        self.cache
            .get_or_try_insert_with(&key, || self.fetch(namespace, name, metric))
            .await
    }

    async fn fetch(
        &self,
        namespace: &str,
        name: &str,
        metric: &str,
    ) -> Result<MetricValue, ProviderError> {
        let pod = self.objects.get_pod(namespace, name).await?;
        let target = resolve_target(&pod)?;
        let url = target.url();

        debug!("Scraping {} for {}/{}", url, namespace, name);
        let status = scrape_status(&self.http, &url).await?;
        let value = status
            .field(metric)
            .ok_or_else(|| ProviderError::MetricNotFound(metric.to_string()))?;

        Ok(MetricValue {
            described_object: ObjectReference::pod(namespace, name),
            metric: MetricIdentifier {
                name: metric.to_string(),
            },
            timestamp: Utc::now(),
            value,
        })
    }

    /// Returns `metric` for every pod matching `selector`.
    ///
    /// Pods whose scrape fails are logged and left out. The result follows
    /// the listing order.
    #[instrument(skip(self))]
    pub async fn get_metric_by_selector(
        self: &Arc<Self>,
        namespace: &str,
        selector: &str,
        metric: &str,
    ) -> Result<Vec<MetricValue>, ProviderError> {
        if !METRIC_NAMES.contains(&metric) {
            return Err(ProviderError::MetricNotFound(metric.to_string()));
        }

        let names = self.objects.list_pods(namespace, selector).await?;
        let mut results: Vec<Option<MetricValue>> = vec![None; names.len()];

        let mut tasks = JoinSet::new();
        for (index, name) in names.into_iter().enumerate() {
            let provider = self.clone();
            let namespace = namespace.to_string();
            let metric = metric.to_string();
            tasks.spawn(async move {
                let result = provider.get_metric_by_name(&namespace, &name, &metric).await;
                (index, name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(value))) => results[index] = Some(value),
                Ok((_, name, Err(e))) => {
                    error!("Failed to get metrics by name for {}/{}: {}", namespace, name, e)
                }
                Err(e) => error!("Metric lookup task failed: {}", e),
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Metrics this provider exposes.
    pub fn list_all_metrics(&self) -> Vec<MetricInfo> {
        METRIC_NAMES
            .iter()
            .map(|&metric| MetricInfo {
                group_resource: "pods",
                metric,
                namespaced: true,
            })
            .collect()
    }
}

/// Fetches a sidecar's JSON status. Anything but a 2xx is an error.
pub async fn scrape_status(http: &reqwest::Client, url: &str) -> Result<Status, ScrapeError> {
    let response = http.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::BadStatus(status.as_u16()));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ScrapeError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_metric_value_shape() {
        let value = MetricValue {
            described_object: ObjectReference::pod("default", "php-0"),
            metric: MetricIdentifier {
                name: "phpfpm_idle_processes".into(),
            },
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            value: 100,
        };

        let json = serde_json::to_value(MetricValueList::new(vec![value])).unwrap();
        assert_eq!(json["kind"], "MetricValueList");
        assert_eq!(json["apiVersion"], API_GROUP_VERSION);

        let item = &json["items"][0];
        assert_eq!(item["describedObject"]["kind"], "Pod");
        assert_eq!(item["describedObject"]["name"], "php-0");
        assert_eq!(item["metric"]["name"], "phpfpm_idle_processes");
        assert_eq!(item["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(item["value"], "100");
    }
}
