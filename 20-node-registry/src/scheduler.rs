use std::{future::Future, sync::Arc, time::Duration};

use tokio::{
    select,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info};

use crate::registry::{RefreshMode, Registry};

/// Drives [`Registry::refresh`] on a fixed period.
pub struct RefreshScheduler {
    registry: Arc<Registry>,
    period: Duration,
}

impl RefreshScheduler {
    pub fn new(registry: Arc<Registry>, period: Duration) -> Self {
        Self { registry, period }
    }

    /// Runs periodic refresh cycles until `shutdown` resolves.
    ///
    /// The first cycle starts one full period after the call. A cycle that
    /// outlasts the period pushes the next one back instead of queueing ticks.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let RefreshScheduler { registry, period } = self;
        tokio::pin!(shutdown);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("refresh scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = registry.refresh(RefreshMode::Periodic).await;
                    debug!(
                        polled = report.polled,
                        refreshed = report.refreshed,
                        failed = report.failed,
                        evicted = report.evicted.len(),
                        "refresh cycle finished"
                    );
                }
            }
        }
    }

    pub fn spawn_until<F>(self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run_until(shutdown))
    }
}
