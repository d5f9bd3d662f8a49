//! Scrape target resolution from pod annotations.
//!
//! A pod can override where its sidecar is scraped with the
//! `fpm.skpr.io/{protocol,port,path}` annotations. Anything not set falls
//! back to `http://<pod ip>:80/metrics`.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProviderError;

/// Protocol used for querying metrics.
pub const ANNOTATION_PROTOCOL: &str = "fpm.skpr.io/protocol";
/// Port used for querying metrics.
pub const ANNOTATION_PORT: &str = "fpm.skpr.io/port";
/// Path used for querying metrics.
pub const ANNOTATION_PATH: &str = "fpm.skpr.io/path";

pub const DEFAULT_PROTOCOL: Protocol = Protocol::Http;
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_PATH: &str = "/metrics";

/// The parts of a pod the provider needs to reach its sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodTarget {
    pub namespace: String,
    pub name: String,
    pub pod_ip: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

/// A fully resolved sidecar address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ScrapeTarget {
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.protocol, self.host, self.port, self.path)
    }
}

/// Resolves where to scrape `pod`. A pod without an IP is an error.
pub fn resolve_target(pod: &PodTarget) -> Result<ScrapeTarget, ProviderError> {
    if pod.pod_ip.trim().is_empty() {
        return Err(ProviderError::MissingAddress {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
        });
    }

    let invalid = |key: &str, value: &str, reason: &str| ProviderError::InvalidAnnotation {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let protocol = match pod.annotations.get(ANNOTATION_PROTOCOL).map(String::as_str) {
        None => DEFAULT_PROTOCOL,
        Some("http") => Protocol::Http,
        Some("https") => Protocol::Https,
        Some(other) => {
            return Err(invalid(
                ANNOTATION_PROTOCOL,
                other,
                "expected \"http\" or \"https\"",
            ))
        }
    };

    let port = match pod.annotations.get(ANNOTATION_PORT) {
        None => DEFAULT_PORT,
        Some(value) => match value.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(invalid(ANNOTATION_PORT, value, "expected a port number")),
        },
    };

    let path = match pod.annotations.get(ANNOTATION_PATH) {
        None => DEFAULT_PATH.to_string(),
        Some(value) if value.starts_with('/') => value.clone(),
        Some(value) => return Err(invalid(ANNOTATION_PATH, value, "must start with '/'")),
    };

    Ok(ScrapeTarget {
        protocol,
        host: pod.pod_ip.clone(),
        port,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(ip: &str, annotations: &[(&str, &str)]) -> PodTarget {
        PodTarget {
            namespace: "default".into(),
            name: "php-0".into(),
            pod_ip: ip.into(),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_defaults() {
        let target = resolve_target(&pod("127.0.0.1", &[])).unwrap();
        assert_eq!(target.url(), "http://127.0.0.1:80/metrics");
    }

    #[test]
    fn test_annotation_override() {
        let target = resolve_target(&pod(
            "127.0.0.70",
            &[
                (ANNOTATION_PROTOCOL, "https"),
                (ANNOTATION_PORT, "443"),
                (ANNOTATION_PATH, "/new-metrics"),
            ],
        ))
        .unwrap();
        assert_eq!(target.url(), "https://127.0.0.70:443/new-metrics");
    }

    #[test]
    fn test_missing_ip_fails_closed() {
        let err = resolve_target(&pod("", &[(ANNOTATION_PORT, "8080")])).unwrap_err();
        assert!(matches!(err, ProviderError::MissingAddress { .. }));
    }

    #[test]
    fn test_invalid_annotations() {
        for annotations in [
            [(ANNOTATION_PORT, "http")],
            [(ANNOTATION_PORT, "70000")],
            [(ANNOTATION_PROTOCOL, "ftp")],
            [(ANNOTATION_PATH, "metrics")],
        ] {
            let err = resolve_target(&pod("10.0.0.1", &annotations)).unwrap_err();
            assert!(
                matches!(err, ProviderError::InvalidAnnotation { .. }),
                "expected {:?} to be rejected",
                annotations
            );
        }
    }
}
