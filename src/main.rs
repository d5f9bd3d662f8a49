//! fpm-metrics-adapter - version 0.1.0
//!
//! Entry point: resolves configuration, initializes logging and runs the
//! sidecar (default), the metrics provider (`adapter`) or a one-shot command.

use anyhow::{anyhow, Context};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};

use fpm_metrics_adapter::cli::{Args, Commands, LogFormat, LogLevel};
use fpm_metrics_adapter::commands::{command_config, command_scrape};
use fpm_metrics_adapter::config::{render_config, resolve_config, validate_effective_config, Config};
use fpm_metrics_adapter::fpm::FpmClient;
use fpm_metrics_adapter::provider::{AdapterConfig, AdapterServer, KubeClient, Provider};
use fpm_metrics_adapter::sidecar::{Server, ServerConfig};

/// Initializes tracing logging subsystem with configured log level and format.
/// Logs go to stderr; stdout is reserved for status lines and command output.
fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("failed to set tracing subscriber: {}", e))?;

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
}

/// Loads the effective configuration. Exits with code 1 if it is invalid.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Cancels `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
    token.cancel();
}

async fn run_sidecar(config: ServerConfig, token: CancellationToken) -> anyhow::Result<()> {
    let source = Arc::new(FpmClient::new(
        config.endpoint.clone(),
        config.status_path.clone(),
        config.scrape_timeout,
    ));

    let server = Server::bind(config, source).context("unable to start sidecar")?;
    server.run(token).await.context("sidecar failed")?;
    Ok(())
}

async fn run_adapter(config: AdapterConfig, token: CancellationToken) -> anyhow::Result<()> {
    let objects = KubeClient::new(
        config.kube_api_url.clone(),
        config.kube_token_file.clone(),
        config.kube_ca_file.clone(),
        config.scrape_timeout,
    )
    .context("unable to construct Kubernetes client")?;

    let http = reqwest::Client::builder()
        .timeout(config.scrape_timeout)
        .build()
        .context("unable to construct HTTP client")?;

    let provider = Arc::new(Provider::new(Arc::new(objects), http, config.cache_ttl));
    let server = AdapterServer::bind(config, provider).context("unable to start adapter")?;
    server.run(token).await.context("unable to run custom metrics adapter")?;
    Ok(())
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        print!("{}", render_config(&config, &args.config_format)?);
        return Ok(());
    }

    if let Some(Commands::Config {
        output,
        format,
        commented,
    }) = &args.command
    {
        return command_config(output.clone(), format.clone(), *commented);
    }

    let config = load_validated_config(&args)?;
    setup_logging(&args)?;

    info!(
        "Starting fpm-metrics-adapter {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
    );

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    match &args.command {
        Some(Commands::Scrape { pretty }) => command_scrape(&config.sidecar()?, *pretty).await,
        Some(Commands::Adapter) => run_adapter(config.adapter()?, token).await,
        Some(Commands::Config { .. }) | None => run_sidecar(config.sidecar()?, token).await,
    }
}
