use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use reorg_monitor::clock::{Clock, SystemClock};
use reorg_monitor::config::MonitorConfig;
use reorg_monitor::metrics;
use reorg_monitor::monitor::Monitor;
use reorg_monitor::rpc::{JsonRpcClient, RpcClient};
use reorg_monitor::telemetry::{init_tracing, TelemetryConfig};

/// Blockchain chain-reorganization monitor.
///
/// Grounded on the teacher's `main.rs` composition style: `#[tokio::main]`
/// wires config, background services, and the primary loop together in one
/// function, with `tokio::spawn` for anything that runs alongside the main
/// loop rather than inside it.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Override the config file search path (defaults to ./config.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = MonitorConfig::load_from(cli.config.as_deref())?;

    init_tracing(TelemetryConfig {
        log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        log_format: config.log_format.clone(),
        log_file: config.log_file.clone(),
        rotation: "daily".to_string(),
    })?;

    if let Err(e) = metrics::init_metrics() {
        warn!(error = %e, "failed to register metrics, continuing without them");
    }

    info!(rpc_url = %config.rpc_url, chain = ?config.chain_name, "starting chain-reorg monitor");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, signaling shutdown");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Some(port) = config.metrics_port {
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(port).await {
                error!(error = %e, "metrics server exited");
            }
        });
    }

    let rpc: Arc<dyn RpcClient> = Arc::new(JsonRpcClient::new(config.rpc_url.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let monitor = Monitor::new(config, rpc, clock);
    monitor.run(shutdown_rx).await;

    Ok(())
}

/// Minimal text-only HTTP responder for Prometheus scraping. The teacher
/// serves its JSON-RPC-style API behind `axum`; this crate has no other HTTP
/// surface, so a full router would be dead weight for one fixed endpoint.
async fn serve_metrics(port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "metrics endpoint listening");

    loop {
        let (mut stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            if stream.read(&mut buf).await.is_err() {
                return;
            }
            let body = metrics::gather_metrics();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });
    }
}
