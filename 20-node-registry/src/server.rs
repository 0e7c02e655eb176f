use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    model::{NodeInfo, RegisteredNode},
    registry::Registry,
    scheduler::RefreshScheduler,
};

/// HTTP front of the registry plus the scheduler that keeps it fresh.
pub struct RegistryServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    refresh_period: Duration,
}

impl RegistryServer {
    pub fn new(listener: TcpListener, registry: Arc<Registry>, refresh_period: Duration) -> Self {
        Self {
            listener,
            registry,
            refresh_period,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests and runs periodic refreshes until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let RegistryServer {
            listener,
            registry,
            refresh_period,
        } = self;

        let (stop_scheduler, scheduler_stopped) = oneshot::channel::<()>();
        let scheduler = RefreshScheduler::new(Arc::clone(&registry), refresh_period).spawn_until(
            async move {
                let _ = scheduler_stopped.await;
            },
        );

        let app = router(registry).into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        info!("registry shutting down");
        let _ = stop_scheduler.send(());
        if let Err(err) = scheduler.await {
            warn!(error = ?err, "refresh scheduler ended abnormally");
        }

        served.map_err(Into::into)
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

/// Routes of the registration endpoint, without the connection-info layer.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/register", post(register_node))
        .route("/nodes", get(list_nodes))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn register_node(
    State(registry): State<Arc<Registry>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<NodeInfo>, JsonRejection>,
) -> StatusCode {
    let Json(info) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(%peer, error = %rejection.body_text(), "could not decode node registration");
            return StatusCode::BAD_REQUEST;
        }
    };

    let observed = client_ip(&headers, peer);
    let name = info.name.clone();
    let outcome = registry.register(info, &observed).await;
    info!(node = %name, %observed, ?outcome, "registration accepted");

    StatusCode::OK
}

async fn list_nodes(State(registry): State<Arc<Registry>>) -> Json<Vec<RegisteredNode>> {
    Json(registry.list().await)
}

/// Address the registering node appears to call from, honouring the usual
/// proxy headers before falling back to the TCP peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map_or_else(|| peer.ip().to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 10], 51000))
    }

    #[test]
    fn client_ip_defaults_to_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "192.0.2.10");
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 10.1.1.1 , 172.16.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));

        assert_eq!(client_ip(&headers, peer()), "10.1.1.1");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static("10.9.9.9"));

        assert_eq!(client_ip(&headers, peer()), "10.9.9.9");
    }
}
