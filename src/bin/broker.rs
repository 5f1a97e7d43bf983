//! switchboard broker - routes calls between registered clients.

use anyhow::{Context, Result};
use clap::Parser;
use switchboard::{Broker, BrokerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "switchboard-broker")]
#[command(about = "Routes method invocations between registered clients")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = switchboard::config::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = switchboard::config::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let broker = Broker::bind(BrokerConfig::new(args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    let table = broker.routing_table();
    let shutdown = broker.shutdown_handle();

    let server = tokio::spawn(broker.run());

    tokio::signal::ctrl_c().await?;
    info!(
        "Shutdown signal received ({} clients, {} calls in flight)",
        table.client_count(),
        table.pending_count()
    );
    shutdown.trigger();

    server.await??;
    Ok(())
}
