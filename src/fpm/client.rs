//! FastCGI status client for the PHP-FPM status page.
//!
//! Requests the status page with `json&full` and decodes either the JSON
//! report or, for pools that answer in plain text, the `key: value` report
//! into a [`Status`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

use super::fcgi;
use super::{Status, StatusSource};
use crate::error::ScrapeError;

const REQUEST_ID: u16 = 1;

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([a-z][a-z ]*[a-z])[ \t]*:[ \t]*(.*?)[ \t\r]*$").expect("valid regex"));

/// Report returned by the FPM status page in JSON mode.
/// https://www.php.net/manual/en/fpm.status.php
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FpmReport {
    #[serde(rename = "process manager")]
    process_manager: String,
    #[serde(rename = "listen queue")]
    listen_queue: i64,
    #[serde(rename = "listen queue len")]
    listen_queue_len: i64,
    #[serde(rename = "idle processes")]
    idle_processes: i64,
    #[serde(rename = "active processes")]
    active_processes: i64,
    #[serde(rename = "total processes")]
    total_processes: i64,
    #[serde(rename = "max active processes")]
    max_active_processes: i64,
}

impl From<FpmReport> for Status {
    fn from(r: FpmReport) -> Self {
        Self {
            process_manager: r.process_manager,
            listen_queue: r.listen_queue,
            listen_queue_len: r.listen_queue_len,
            idle_processes: r.idle_processes,
            active_processes: r.active_processes,
            total_processes: r.total_processes,
            max_active_processes: r.max_active_processes,
        }
    }
}

/// Queries one FPM pool over FastCGI/TCP.
#[derive(Debug, Clone)]
pub struct FpmClient {
    endpoint: String,
    status_path: String,
    timeout: Duration,
}

impl FpmClient {
    pub fn new(endpoint: impl Into<String>, status_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            status_path: status_path.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One round-trip without the timeout wrapper.
    async fn query(&self) -> Result<Status, ScrapeError> {
        let mut stream =
            TcpStream::connect(&self.endpoint)
                .await
                .map_err(|source| ScrapeError::Connect {
                    endpoint: self.endpoint.clone(),
                    source,
                })?;

        let params = [
            ("GATEWAY_INTERFACE", "FastCGI/1.0"),
            ("REQUEST_METHOD", "GET"),
            ("SCRIPT_FILENAME", self.status_path.as_str()),
            ("SCRIPT_NAME", self.status_path.as_str()),
            ("REQUEST_URI", self.status_path.as_str()),
            ("QUERY_STRING", "json&full"),
            ("SERVER_PROTOCOL", "HTTP/1.1"),
        ];

        stream
            .write_all(&fcgi::encode_request(REQUEST_ID, &params))
            .await?;
        stream.flush().await?;

        let response = fcgi::read_response(&mut stream, REQUEST_ID).await?;
        debug!(
            "FPM request finished with app status {}, {} bytes of output",
            response.app_status,
            response.stdout.len()
        );
        if !response.stderr.is_empty() {
            warn!(
                "FPM wrote to stderr: {}",
                String::from_utf8_lossy(&response.stderr).trim()
            );
        }

        let (code, body) = split_cgi_response(&response.stdout)?;
        // PHP-FPM omits the Status header on success
        if code != 200 && code != 0 {
            return Err(ScrapeError::BadStatus(code));
        }

        parse_status_body(body)
    }
}

#[async_trait]
impl StatusSource for FpmClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn scrape(&self) -> Result<Status, ScrapeError> {
        let status = tokio::time::timeout(self.timeout, self.query())
            .await
            .map_err(|_| ScrapeError::Timeout(self.timeout))??;
        debug!("Scraped FPM status: {:?}", status);
        Ok(status)
    }
}

/// Splits a CGI response into its status code (0 if absent) and body.
pub fn split_cgi_response(raw: &[u8]) -> Result<(u16, &[u8]), ScrapeError> {
    let (head, body) = match find_subslice(raw, b"\r\n\r\n") {
        Some(pos) => (&raw[..pos], &raw[pos + 4..]),
        None => match find_subslice(raw, b"\n\n") {
            Some(pos) => (&raw[..pos], &raw[pos + 2..]),
            None => {
                return Err(ScrapeError::Protocol(
                    "response has no header terminator".to_string(),
                ))
            }
        },
    };

    let head = String::from_utf8_lossy(head);
    let mut code = 0;
    for line in head.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("status") {
            code = value
                .split_whitespace()
                .next()
                .and_then(|c| c.parse().ok())
                .ok_or_else(|| ScrapeError::Protocol(format!("invalid status header: {line}")))?;
        }
    }

    Ok((code, body))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decodes a status page body, JSON or plain text.
pub fn parse_status_body(body: &[u8]) -> Result<Status, ScrapeError> {
    let text = std::str::from_utf8(body).map_err(|e| ScrapeError::Decode(e.to_string()))?;
    let trimmed = text.trim_start();

    if trimmed.starts_with('{') {
        let report: FpmReport =
            serde_json::from_str(trimmed).map_err(|e| ScrapeError::Decode(format!("failed to decode json: {e}")))?;
        return Ok(report.into());
    }

    parse_text_status(trimmed)
}

/// Parses the plain-text status page (`listen queue:        0`, ...).
///
/// Only the pool summary is read; with `full` the per-process blocks that
/// follow the first `***` separator are ignored.
pub fn parse_text_status(text: &str) -> Result<Status, ScrapeError> {
    let summary = text.split("\n*").next().unwrap_or_default();
    let mut status = Status::default();
    let mut matched = false;

    for caps in STATUS_LINE.captures_iter(summary) {
        let key = &caps[1];
        let value = &caps[2];

        let slot = match key {
            "process manager" => {
                status.process_manager = value.to_string();
                matched = true;
                continue;
            }
            "listen queue" => &mut status.listen_queue,
            "listen queue len" => &mut status.listen_queue_len,
            "idle processes" => &mut status.idle_processes,
            "active processes" => &mut status.active_processes,
            "total processes" => &mut status.total_processes,
            "max active processes" => &mut status.max_active_processes,
            _ => continue,
        };

        *slot = value
            .parse()
            .map_err(|_| ScrapeError::Decode(format!("invalid value for {key}: {value}")))?;
        matched = true;
    }

    if !matched {
        return Err(ScrapeError::Decode(
            "no status fields found in response".to_string(),
        ));
    }

    Ok(status)
}
