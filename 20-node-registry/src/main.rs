use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use node_registry::{
    cli::{Cli, Command, ServeArgs},
    client,
    config::RegistryConfig,
    registry::Registry,
    server::RegistryServer,
    status::HttpStatusClient,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(&args).await?,
        Command::Register(args) => client::register(args).await?,
        Command::Nodes(args) => client::nodes(args).await?,
    }

    Ok(())
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let config = RegistryConfig::from(args);

    let status_client = HttpStatusClient::new(config.status_port, config.status_timeout)
        .context("failed to build status client")?;
    let registry = Arc::new(Registry::new(
        Arc::new(status_client),
        config.eviction_threshold,
    ));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("could not start registration server on {}", config.listen))?;
    let server = RegistryServer::new(listener, registry, config.refresh_period);
    let addr = server.local_addr()?;
    info!(
        refresh_period = ?config.refresh_period,
        eviction_threshold = config.eviction_threshold,
        status_port = config.status_port,
        "registry configured"
    );
    info!("registry listening on {}", addr);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("registry exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
