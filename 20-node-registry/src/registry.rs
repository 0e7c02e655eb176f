//! The authoritative node list and everything that mutates it.
//!
//! All state lives in one `Vec<RegisteredNode>` behind a single tokio mutex.
//! Registration and refresh each hold that lock for their whole duration, so
//! a concurrent [`Registry::list`] only ever observes the state before or
//! after one of them, never a partially applied one. Refresh keeps the lock
//! while its status requests are in flight; that is what stops two refresh
//! cycles from overlapping.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    model::{NodeInfo, RegisteredNode},
    status::StatusClient,
};

/// How a refresh treats nodes that fail to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Scheduled cycle: every failure counts toward eviction.
    Periodic,
    /// Issued right after a registration; failures are forgiven because the
    /// node may still be coming up.
    Grace,
}

/// What a registration did to the node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First time this name was seen; a new entry was appended.
    Added,
    /// Known name announcing a different address; the entry was updated in place.
    Relocated,
    /// Known name at the same address; descriptive fields were refreshed in place.
    Unchanged,
}

impl Registration {
    fn wants_grace_refresh(self) -> bool {
        matches!(self, Registration::Added | Registration::Relocated)
    }
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Nodes with an address that were asked for their status.
    pub polled: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Names removed by the eviction pass, in list order.
    pub evicted: Vec<String>,
}

pub struct Registry {
    nodes: Mutex<Vec<RegisteredNode>>,
    client: Arc<dyn StatusClient>,
    eviction_threshold: u32,
}

impl Registry {
    pub fn new(client: Arc<dyn StatusClient>, eviction_threshold: u32) -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            client,
            eviction_threshold,
        }
    }

    /// Records `info` as announced by a node whose request came from
    /// `observed_address`.
    ///
    /// Names are unique: a known name is updated in place rather than
    /// duplicated. When the node is new or has moved, a grace refresh is
    /// spawned once the lock has been released; the caller does not wait for it.
    pub async fn register(self: &Arc<Self>, info: NodeInfo, observed_address: &str) -> Registration {
        let outcome = self.reconcile(info, observed_address).await;

        if outcome.wants_grace_refresh() {
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                registry.refresh(RefreshMode::Grace).await;
            });
        }

        outcome
    }

    async fn reconcile(&self, info: NodeInfo, observed_address: &str) -> Registration {
        let mut nodes = self.nodes.lock().await;

        if observed_address != info.local_ip {
            warn!(
                node = %info.name,
                local_ip = %info.local_ip,
                observed = %observed_address,
                "client address differs from announced local address"
            );
        }

        let Some(existing) = nodes.iter_mut().find(|node| node.info.name == info.name) else {
            info!(node = %info.name, local_ip = %info.local_ip, "registered new node");
            nodes.push(RegisteredNode::new(info));
            return Registration::Added;
        };

        if existing.info.local_ip == info.local_ip {
            debug!(node = %info.name, "node re-registered at the same address");
            existing.info = info;
            return Registration::Unchanged;
        }

        warn!(
            node = %info.name,
            previous = %existing.info.local_ip,
            current = %info.local_ip,
            "known node re-registered with a different local address"
        );
        existing.info = info;
        Registration::Relocated
    }

    /// Copy of every entry, in registration order.
    pub async fn list(&self) -> Vec<RegisteredNode> {
        self.nodes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }

    /// Polls every addressable node concurrently, applies the answers, then
    /// evicts nodes whose failure count went past the threshold.
    ///
    /// Eviction only starts once every request of this cycle has resolved.
    pub async fn refresh(&self, mode: RefreshMode) -> RefreshReport {
        let mut nodes = self.nodes.lock().await;
        debug!(?mode, nodes = nodes.len(), "refreshing node status");

        let targets: Vec<(usize, String)> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.info.local_ip.is_empty())
            .map(|(index, node)| (index, node.info.local_ip.clone()))
            .collect();

        let client = self.client.as_ref();
        let results = join_all(targets.into_iter().map(|(index, local_ip)| async move {
            (index, client.fetch_status(&local_ip).await)
        }))
        .await;

        let mut report = RefreshReport {
            polled: results.len(),
            ..RefreshReport::default()
        };

        for (index, result) in results {
            let node = &mut nodes[index];
            match result {
                Ok(status) => {
                    node.status = status;
                    node.consecutive_failures = 0;
                    report.refreshed += 1;
                }
                Err(error) => {
                    report.failed += 1;
                    if mode == RefreshMode::Periodic {
                        node.consecutive_failures = node.consecutive_failures.saturating_add(1);
                    }
                    warn!(
                        node = %node.info.name,
                        failures = node.consecutive_failures,
                        %error,
                        "node did not answer status request"
                    );
                }
            }
        }

        report.evicted = self.evict(&mut nodes);
        report
    }

    fn evict(&self, nodes: &mut Vec<RegisteredNode>) -> Vec<String> {
        let mut evicted = Vec::new();
        nodes.retain(|node| {
            if node.consecutive_failures > self.eviction_threshold {
                info!(node = %node.info.name, "no signs of node, removing it");
                evicted.push(node.info.name.clone());
                false
            } else {
                true
            }
        });
        evicted
    }
}
