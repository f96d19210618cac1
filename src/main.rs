//! CLI entry point (spec §1: CLI parsing is out of scope beyond a handful
//! of flags; config-file parsing to the validated data model is in scope).
//!
//! Mirrors the teacher's `tracing_subscriber::fmt().with_env_filter(...)`
//! startup sequence, swapping the Tauri app shell for a `clap` derive CLI
//! and the aggregator's own HTTP/stdio transport selection.

use agg_mcp::lazy::{FallbackPolicy, LazyMode};
use agg_mcp::transport_in;
use agg_mcp::{pidfile::PidFile, Aggregator};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LazyModeArg {
    Full,
    Metatool,
    Hybrid,
}

impl From<LazyModeArg> for LazyMode {
    fn from(value: LazyModeArg) -> Self {
        match value {
            LazyModeArg::Full => LazyMode::Full,
            LazyModeArg::Metatool => LazyMode::Metatool,
            LazyModeArg::Hybrid => LazyMode::Hybrid,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "agg-mcp", version, about = "Aggregating proxy for the Model Context Protocol")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, env = "ONE_MCP_CONFIG", default_value = "agg-mcp.json")]
    config: PathBuf,

    /// Inbound transport to serve.
    #[arg(long, value_enum, default_value = "http")]
    transport: TransportArg,

    /// Port for the HTTP transport (ignored for stdio).
    #[arg(long, default_value_t = 3051)]
    port: u16,

    /// Host to bind the HTTP transport to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Minimum log level, also settable via ONE_MCP_LOG_LEVEL.
    #[arg(long, env = "ONE_MCP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Tool-schema lazy-loading mode (spec §4.4).
    #[arg(long, value_enum, default_value = "full")]
    lazy_mode: LazyModeArg,

    /// What to do when a lazily-fetched schema request fails.
    #[arg(long, value_enum, default_value = "skip")]
    fallback: FallbackArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FallbackArg {
    Skip,
    Full,
}

impl From<FallbackArg> for FallbackPolicy {
    fn from(value: FallbackArg) -> Self {
        match value {
            FallbackArg::Skip => FallbackPolicy::Skip,
            FallbackArg::Full => FallbackPolicy::Full,
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone())))
        .init();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {}", e);
            std::process::ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> agg_mcp::error::ProxyResult<()> {
    tracing::info!("agg-mcp starting, config = {:?}, transport = {:?}", cli.config, cli.transport);

    let aggregator = Aggregator::bootstrap(cli.config.clone(), cli.lazy_mode.into(), cli.fallback.into()).await?;
    aggregator.spawn_background_tasks(30);

    let config_dir = aggregator.config_dir.clone();
    let started_at = chrono::Utc::now().to_rfc3339();

    match cli.transport {
        TransportArg::Http => {
            let pidfile = PidFile::new(cli.port, &cli.host, "http", &config_dir, started_at);
            pidfile.write(&config_dir)?;

            let result = transport_in::start_http_server(cli.port, aggregator.lazy.clone()).await;
            PidFile::remove(&config_dir);
            aggregator.shutdown().await;
            result
        }
        TransportArg::Stdio => {
            let pidfile = PidFile::new(cli.port, &cli.host, "stdio", &config_dir, started_at);
            pidfile.write(&config_dir)?;

            transport_in::stdio::run(aggregator.lazy.clone()).await;
            PidFile::remove(&config_dir);
            aggregator.shutdown().await;
            Ok(())
        }
    }
}
