use anyhow::{Context, Result};
use tokio::io::{self, AsyncWriteExt};
use tracing::info;

use crate::{
    cli::{NodesArgs, RegisterArgs},
    model::{NodeInfo, NodeView},
};

pub async fn register(args: RegisterArgs) -> Result<()> {
    let info = node_info_from(&args);
    let url = endpoint(&args.registry, "register");

    reqwest::Client::new()
        .post(&url)
        .json(&info)
        .send()
        .await
        .with_context(|| format!("failed to reach registry at {url}"))?
        .error_for_status()
        .context("registry rejected the registration")?;

    info!(node = %info.name, registry = %args.registry, "node registered");
    write_stdout(&format!("*** registered {} ({})", info.name, info.local_ip)).await?;
    Ok(())
}

pub async fn nodes(args: NodesArgs) -> Result<()> {
    let listing = fetch_nodes(&args.registry).await?;
    let rendered = serde_json::to_string_pretty(&listing).context("failed to render listing")?;
    write_stdout(&rendered).await?;
    Ok(())
}

/// Reads the registry listing at `registry` (a base URL).
pub async fn fetch_nodes(registry: &str) -> Result<Vec<NodeView>> {
    let url = endpoint(registry, "nodes");
    reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach registry at {url}"))?
        .error_for_status()
        .context("registry refused the listing")?
        .json()
        .await
        .context("registry sent an unreadable listing")
}

fn node_info_from(args: &RegisterArgs) -> NodeInfo {
    args.fields.iter().fold(
        NodeInfo::new(args.name.clone(), args.local_ip.clone()),
        |info, (key, value)| info.with_field(key.clone(), value.clone()),
    )
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{path}", base.trim_end_matches('/'))
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
