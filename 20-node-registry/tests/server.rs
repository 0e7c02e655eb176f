use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode, header::CONTENT_TYPE},
    routing::get,
};
use node_registry::{
    client::fetch_nodes,
    model::{NodeInfo, NodeStatus, NodeView},
    registry::{RefreshMode, Registry},
    server::{RegistryServer, router},
    status::{HttpStatusClient, StatusClient, StatusError},
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, time::timeout};
use tower::ServiceExt;

/// Status answers keyed by node address; unknown addresses time out.
#[derive(Default)]
struct ScriptedNodes {
    answers: Mutex<HashMap<String, Value>>,
}

impl ScriptedNodes {
    fn answer(&self, local_ip: &str, status: Value) {
        self.answers
            .lock()
            .expect("answers lock")
            .insert(local_ip.to_string(), status);
    }

    fn go_silent(&self, local_ip: &str) {
        self.answers.lock().expect("answers lock").remove(local_ip);
    }
}

#[async_trait]
impl StatusClient for ScriptedNodes {
    async fn fetch_status(&self, local_ip: &str) -> Result<NodeStatus, StatusError> {
        let answer = self
            .answers
            .lock()
            .expect("answers lock")
            .get(local_ip)
            .cloned();
        match answer {
            Some(status) => Ok(serde_json::from_value(status).expect("scripted status object")),
            None => Err(StatusError::Timeout {
                url: format!("http://{local_ip}:8081/status"),
            }),
        }
    }
}

fn app(registry: Arc<Registry>) -> Router {
    router(registry).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 40000))))
}

fn register_request(body: Value) -> Request<Body> {
    Request::post("/register")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("register request")
}

async fn listing(app: Router) -> Result<Value> {
    let response = app
        .oneshot(Request::get("/nodes").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn registration_then_refresh_then_eviction() -> Result<()> {
    let nodes = Arc::new(ScriptedNodes::default());
    nodes.answer("10.0.0.1", json!({ "ok": true }));
    let registry = Arc::new(Registry::new(nodes.clone(), 3));

    let response = app(registry.clone())
        .oneshot(register_request(json!({ "name": "a", "localIp": "10.0.0.1" })))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.len().await, 1);

    registry.refresh(RefreshMode::Periodic).await;
    assert_eq!(
        listing(app(registry.clone())).await?,
        json!([{ "info": { "name": "a", "localIp": "10.0.0.1" }, "status": { "ok": true } }])
    );

    nodes.go_silent("10.0.0.1");
    for _ in 0..3 {
        let report = registry.refresh(RefreshMode::Periodic).await;
        assert!(report.evicted.is_empty());
    }
    assert_eq!(registry.len().await, 1, "still listed after threshold failures");

    let report = registry.refresh(RefreshMode::Periodic).await;
    assert_eq!(report.evicted, vec!["a".to_string()]);
    assert_eq!(listing(app(registry)).await?, json!([]));

    Ok(())
}

#[tokio::test]
async fn malformed_registration_is_rejected() -> Result<()> {
    let nodes = Arc::new(ScriptedNodes::default());
    let registry = Arc::new(Registry::new(nodes, 3));

    let not_json = Request::post("/register")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{ name: "))?;
    let response = app(registry.clone()).oneshot(not_json).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing_name = register_request(json!({ "localIp": "10.0.0.1" }));
    let response = app(registry.clone()).oneshot(missing_name).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let no_content_type = Request::post("/register")
        .body(Body::from(json!({ "name": "a" }).to_string()))?;
    let response = app(registry.clone()).oneshot(no_content_type).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(registry.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn listing_carries_extra_fields_but_not_counters() -> Result<()> {
    let nodes = Arc::new(ScriptedNodes::default());
    let registry = Arc::new(Registry::new(nodes, 3));

    app(registry.clone())
        .oneshot(register_request(
            json!({ "name": "cam", "localIp": "10.0.0.3", "role": "camera" }),
        ))
        .await?;
    registry.refresh(RefreshMode::Periodic).await;

    let listed = listing(app(registry)).await?;
    assert_eq!(listed[0]["info"]["role"], json!("camera"));
    assert_eq!(listed[0]["status"], json!({}));
    assert_eq!(
        listed[0].as_object().map(|entry| entry.len()),
        Some(2),
        "only info and status are exposed"
    );
    Ok(())
}

#[tokio::test]
async fn renamed_address_does_not_grow_the_registry() -> Result<()> {
    let nodes = Arc::new(ScriptedNodes::default());
    let registry = Arc::new(Registry::new(nodes, 3));

    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.2"] {
        let response = app(registry.clone())
            .oneshot(register_request(json!({ "name": "a", "localIp": ip })))
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let nodes = registry.list().await;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].info(), &NodeInfo::new("a", "10.0.0.2"));
    Ok(())
}

#[tokio::test]
async fn live_registry_polls_real_status_endpoint() -> Result<()> {
    let status_listener = TcpListener::bind("127.0.0.1:0").await?;
    let status_addr = status_listener.local_addr()?;
    let node = Router::new().route("/status", get(|| async { Json(json!({ "ok": true })) }));
    tokio::spawn(async move {
        let _ = axum::serve(status_listener, node).await;
    });

    let status_client = HttpStatusClient::new(status_addr.port(), Duration::from_secs(2))?;
    let registry = Arc::new(Registry::new(Arc::new(status_client), 3));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let server = RegistryServer::new(listener, registry, Duration::from_secs(3600));
    let addr = server.local_addr()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        server.run_until(shutdown).await
    });

    let base = format!("http://{addr}");
    let response = reqwest::Client::new()
        .post(format!("{base}/register"))
        .json(&NodeInfo::new("local", "127.0.0.1"))
        .send()
        .await?;
    assert!(response.status().is_success());

    // The grace refresh fills in the status well before the next period.
    let listed: Vec<NodeView> = timeout(Duration::from_secs(3), async {
        loop {
            let listed = fetch_nodes(&base).await?;
            if listed.iter().any(|node| !node.status.is_empty()) {
                return anyhow::Ok(listed);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await??;

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].info.name, "local");
    assert_eq!(listed[0].status.get("ok"), Some(&json!(true)));

    let _ = shutdown_tx.send(());
    timeout(Duration::from_secs(2), running).await???;

    Ok(())
}
