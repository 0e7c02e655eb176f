use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::{
        DEFAULT_EVICTION_THRESHOLD, DEFAULT_LISTEN_ADDR, DEFAULT_REFRESH_PERIOD_SECS,
        DEFAULT_STATUS_PORT, DEFAULT_STATUS_TIMEOUT_MS,
    },
    model::RESERVED_FIELDS,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the registry: accept registrations and poll registered nodes.
    Serve(ServeArgs),
    /// Register a node with a running registry.
    Register(RegisterArgs),
    /// Print the nodes currently known to a running registry.
    Nodes(NodesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the registry should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// Seconds between two scheduled refresh cycles.
    #[arg(
        long,
        default_value_t = DEFAULT_REFRESH_PERIOD_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub refresh_period_secs: u64,

    /// Consecutive failed refreshes tolerated before a node is removed.
    #[arg(long, default_value_t = DEFAULT_EVICTION_THRESHOLD)]
    pub eviction_threshold: u32,

    /// Timeout of a single status request, in milliseconds.
    #[arg(
        long,
        default_value_t = DEFAULT_STATUS_TIMEOUT_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub status_timeout_ms: u64,

    /// Port on which nodes expose their `/status` endpoint.
    #[arg(long, default_value_t = DEFAULT_STATUS_PORT)]
    pub status_port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Base URL of the registry.
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    pub registry: String,

    /// Name the node registers under.
    #[arg(long)]
    pub name: String,

    /// Address the registry should use to reach the node's status endpoint.
    #[arg(long, default_value = "")]
    pub local_ip: String,

    /// Extra descriptive field, as `key=value`. May be repeated.
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct NodesArgs {
    /// Base URL of the registry.
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    pub registry: String,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if RESERVED_FIELDS.contains(&key.trim()) => Err(format!(
            "'{}' is set by its own flag and cannot be passed as a field",
            key.trim()
        )),
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
