//! Scrape command implementation.
//!
//! Queries the configured FPM pool once and prints the status as JSON.

use std::time::Instant;

use crate::fpm::{FpmClient, StatusSource};
use crate::sidecar::ServerConfig;

/// Scrapes the FPM endpoint once and prints the result to stdout.
pub async fn command_scrape(config: &ServerConfig, pretty: bool) -> anyhow::Result<()> {
    let client = FpmClient::new(
        config.endpoint.clone(),
        config.status_path.clone(),
        config.scrape_timeout,
    );

    let start = Instant::now();
    let status = client.scrape().await?;
    eprintln!(
        "🧪 Scraped {}{} in {:.1} ms",
        client.endpoint(),
        config.status_path,
        start.elapsed().as_secs_f64() * 1000.0
    );

    let output = if pretty {
        serde_json::to_string_pretty(&status)?
    } else {
        serde_json::to_string(&status)?
    };
    println!("{}", output);

    Ok(())
}
