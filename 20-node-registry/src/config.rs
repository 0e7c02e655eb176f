use std::{net::SocketAddr, time::Duration};

use crate::cli::ServeArgs;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4000";
pub const DEFAULT_REFRESH_PERIOD_SECS: u64 = 60;
pub const DEFAULT_EVICTION_THRESHOLD: u32 = 3;
pub const DEFAULT_STATUS_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_STATUS_PORT: u16 = 8081;

/// Settings fixed for the lifetime of a registry process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub listen: SocketAddr,
    pub refresh_period: Duration,
    /// A node is evicted once its consecutive failures exceed this value.
    pub eviction_threshold: u32,
    pub status_timeout: Duration,
    pub status_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 4000)),
            refresh_period: Duration::from_secs(DEFAULT_REFRESH_PERIOD_SECS),
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            status_timeout: Duration::from_millis(DEFAULT_STATUS_TIMEOUT_MS),
            status_port: DEFAULT_STATUS_PORT,
        }
    }
}

impl From<&ServeArgs> for RegistryConfig {
    fn from(args: &ServeArgs) -> Self {
        Self {
            listen: args.listen,
            refresh_period: Duration::from_secs(args.refresh_period_secs),
            eviction_threshold: args.eviction_threshold,
            status_timeout: Duration::from_millis(args.status_timeout_ms),
            status_port: args.status_port,
        }
    }
}
