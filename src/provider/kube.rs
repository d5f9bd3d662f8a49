//! Pod lookup against the Kubernetes API.
//!
//! Only two calls are needed: get one pod, and list pod names matching a
//! label selector. [`KubeClient`] talks to the REST API directly with the
//! service account credentials mounted into the pod.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Certificate, Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::target::PodTarget;
use crate::error::ProviderError;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

// RFC 1123 label (namespaces) and subdomain (pod names).
static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));
static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid regex")
});

fn check_namespace(namespace: &str) -> Result<(), ProviderError> {
    if namespace.len() <= 63 && DNS_LABEL.is_match(namespace) {
        Ok(())
    } else {
        Err(ProviderError::InvalidName {
            kind: "namespace",
            value: namespace.to_string(),
        })
    }
}

fn check_pod_name(name: &str) -> Result<(), ProviderError> {
    if name.len() <= 253 && DNS_SUBDOMAIN.is_match(name) {
        Ok(())
    } else {
        Err(ProviderError::InvalidName {
            kind: "pod",
            value: name.to_string(),
        })
    }
}

/// Where the provider finds pods.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodTarget, ProviderError>;

    /// Names of the pods in `namespace` matching `selector`, in API order.
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>, ProviderError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectMeta {
    name: String,
    namespace: String,
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodStatus {
    #[serde(rename = "podIP")]
    pod_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pod {
    metadata: ObjectMeta,
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodList {
    items: Vec<Pod>,
}

impl From<Pod> for PodTarget {
    fn from(pod: Pod) -> Self {
        Self {
            namespace: pod.metadata.namespace,
            name: pod.metadata.name,
            pod_ip: pod.status.pod_ip,
            annotations: pod.metadata.annotations,
        }
    }
}

/// Minimal Kubernetes REST client for pods.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl KubeClient {
    /// Builds a client from explicit settings, falling back to the
    /// in-cluster environment and service account for anything unset.
    pub fn new(
        api_url: Option<String>,
        token_file: Option<PathBuf>,
        ca_file: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = match api_url {
            Some(url) => url,
            None => in_cluster_url()?,
        };
        let base_url = Url::parse(&base_url)
            .map_err(|e| ProviderError::Kube(format!("invalid API URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Kube(format!("invalid API URL {}", base_url)));
        }

        let token_file =
            token_file.or_else(|| existing(Path::new(SERVICE_ACCOUNT_DIR).join("token")));
        let token = match token_file {
            Some(path) => Some(read_file(&path)?.trim().to_string()),
            None => None,
        };

        let mut builder = Client::builder().timeout(timeout);
        if let Some(path) = ca_file.or_else(|| existing(Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt"))) {
            let pem = read_file(&path)?;
            let cert = Certificate::from_pem(pem.as_bytes())
                .map_err(|e| ProviderError::Kube(format!("invalid CA bundle {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| ProviderError::Kube(format!("failed to build client: {}", e)))?;

        info!("Using Kubernetes API at {}", base_url);
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Appends `segments` to the API URL, escaping each one.
    fn api_url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Kube(format!("invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<(StatusCode, Option<T>), ProviderError> {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Kube(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Ok((status, None));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Kube(format!("failed to decode response: {}", e)))?;
        Ok((status, Some(body)))
    }
}

#[async_trait]
impl ObjectSource for KubeClient {
    #[instrument(skip(self))]
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodTarget, ProviderError> {
        check_namespace(namespace)?;
        check_pod_name(name)?;
        let url = self.api_url(&["api", "v1", "namespaces", namespace, "pods", name])?;

        match self.get_json::<Pod>(url, &[]).await? {
            (_, Some(pod)) => Ok(pod.into()),
            (StatusCode::NOT_FOUND, None) => Err(ProviderError::ObjectNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            (status, None) => Err(ProviderError::Kube(format!(
                "get pod {}/{}: status code was: {}",
                namespace, name, status
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>, ProviderError> {
        check_namespace(namespace)?;
        let url = self.api_url(&["api", "v1", "namespaces", namespace, "pods"])?;

        match self
            .get_json::<PodList>(url, &[("labelSelector", selector)])
            .await?
        {
            (_, Some(list)) => {
                debug!("Selector {:?} matched {} pods", selector, list.items.len());
                Ok(list.items.into_iter().map(|p| p.metadata.name).collect())
            }
            (status, None) => Err(ProviderError::Kube(format!(
                "list pods in {}: status code was: {}",
                namespace, status
            ))),
        }
    }
}

fn in_cluster_url() -> Result<String, ProviderError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
        ProviderError::Kube("KUBERNETES_SERVICE_HOST is not set and no API URL was given".into())
    })?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

    if host.contains(':') {
        Ok(format!("https://[{}]:{}", host, port))
    } else {
        Ok(format!("https://{}:{}", host, port))
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}

fn read_file(path: &Path) -> Result<String, ProviderError> {
    fs::read_to_string(path)
        .map_err(|e| ProviderError::Kube(format!("failed to read {}: {}", path.display(), e)))
}
