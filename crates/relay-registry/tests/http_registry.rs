//! HttpRegistry tests against an in-process registry server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use relay_common::config::RegistryConfig;
use relay_registry::http::HttpRegistry;
use relay_registry::{InstanceMeta, Registry};

#[derive(Default)]
struct RegistryState {
    services: HashMap<String, Vec<InstanceMeta>>,
    versions: HashMap<String, i64>,
    renews: Vec<String>,
    failing: bool,
}

type Shared = Arc<Mutex<RegistryState>>;

fn query_param(req: &Request<Incoming>, key: &str) -> Option<String> {
    let query = req.uri().query()?;
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            return Some(v.replace("%2C", ","));
        }
    }
    None
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

async fn handle(state: Shared, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if state.lock().unwrap().failing {
        return text(StatusCode::INTERNAL_SERVER_ERROR, "down".to_string());
    }

    let path = req.uri().path().to_string();
    match path.as_str() {
        "/reg" => {
            let service = query_param(&req, "service").unwrap();
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let meta: InstanceMeta = serde_json::from_slice(&body).unwrap();
            let mut state = state.lock().unwrap();
            state.services.entry(service.clone()).or_default().push(meta);
            *state.versions.entry(service).or_insert(0) += 1;
            text(StatusCode::OK, "ok".to_string())
        }
        "/unreg" => {
            let service = query_param(&req, "service").unwrap();
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let meta: InstanceMeta = serde_json::from_slice(&body).unwrap();
            let mut state = state.lock().unwrap();
            if let Some(list) = state.services.get_mut(&service) {
                list.retain(|m| m.to_instance() != meta.to_instance());
            }
            *state.versions.entry(service).or_insert(0) += 1;
            text(StatusCode::OK, "ok".to_string())
        }
        "/findAll" => {
            let service = query_param(&req, "service").unwrap();
            let state = state.lock().unwrap();
            let list = state.services.get(&service).cloned().unwrap_or_default();
            text(StatusCode::OK, serde_json::to_string(&list).unwrap())
        }
        "/renews" => {
            let services = query_param(&req, "services").unwrap();
            state.lock().unwrap().renews.push(services);
            text(StatusCode::OK, "ok".to_string())
        }
        "/version" => {
            let service = query_param(&req, "service").unwrap();
            let state = state.lock().unwrap();
            let version = state.versions.get(&service).copied().unwrap_or(0);
            text(StatusCode::OK, version.to_string())
        }
        _ => text(StatusCode::NOT_FOUND, "not found".to_string()),
    }
}

async fn spawn_registry_server() -> (SocketAddr, Shared) {
    let state: Shared = Arc::new(Mutex::new(RegistryState::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let io = TokioIo::new(stream);
            let state = Arc::clone(&server_state);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, hyper::Error>(handle(state, req).await) }
                });
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    (addr, state)
}

fn config_for(addr: SocketAddr) -> RegistryConfig {
    RegistryConfig {
        address: format!("http://{addr}"),
        app: "app1".to_string(),
        env: "dev".to_string(),
        heartbeat_interval_ms: 50,
        poll_interval_ms: 50,
    }
}

#[tokio::test]
async fn register_then_fetch() {
    let (addr, _state) = spawn_registry_server().await;
    let registry = HttpRegistry::new(config_for(addr)).unwrap();
    registry.start().await.unwrap();

    registry.register("EchoService", "127.0.0.1:9001").await.unwrap();
    let list = registry.fetch_all("EchoService").await.unwrap();
    assert_eq!(list, vec!["127.0.0.1:9001"]);

    registry.stop().await;
}

#[tokio::test]
async fn fetch_falls_back_to_cache_when_server_fails() {
    let (addr, state) = spawn_registry_server().await;
    let registry = HttpRegistry::new(config_for(addr)).unwrap();

    registry.register("EchoService", "127.0.0.1:9001").await.unwrap();
    let fresh = registry.fetch_all("EchoService").await.unwrap();
    assert_eq!(fresh, vec!["127.0.0.1:9001"]);

    state.lock().unwrap().failing = true;

    let stale = registry.fetch_all("EchoService").await.unwrap();
    assert_eq!(stale, vec!["127.0.0.1:9001"]);

    // A service never fetched successfully yields empty, not an error.
    let unknown = registry.fetch_all("OtherService").await.unwrap();
    assert!(unknown.is_empty());

    registry.stop().await;
}

#[tokio::test]
async fn heartbeat_renews_all_registered_services_in_one_call() {
    let (addr, state) = spawn_registry_server().await;
    let registry = HttpRegistry::new(config_for(addr)).unwrap();

    registry.register("EchoService", "127.0.0.1:9001").await.unwrap();
    registry.register("GreetService", "127.0.0.1:9001").await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let renews = state.lock().unwrap().renews.clone();
    assert!(!renews.is_empty(), "no renewals observed");
    assert!(
        renews.iter().any(|csv| csv == "EchoService,GreetService"),
        "expected one batched renewal, got {renews:?}"
    );

    registry.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn subscription_fires_once_per_version_change() {
    let (addr, state) = spawn_registry_server().await;
    let registry = HttpRegistry::new(config_for(addr)).unwrap();

    registry.register("EchoService", "127.0.0.1:9001").await.unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    registry
        .subscribe(
            "EchoService",
            Box::new(move |list| {
                let _ = tx.send(list);
            }),
        )
        .await
        .unwrap();

    // Membership change made behind the registry client's back.
    {
        let mut state = state.lock().unwrap();
        state
            .services
            .get_mut("EchoService")
            .unwrap()
            .push(InstanceMeta::from_instance("127.0.0.1:9002").unwrap());
        *state.versions.get_mut("EchoService").unwrap() += 1;
    }

    let list = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(list, vec!["127.0.0.1:9001", "127.0.0.1:9002"]);

    registry.stop().await;
}

#[tokio::test]
async fn unregister_is_best_effort_against_a_dead_server() {
    let (addr, state) = spawn_registry_server().await;
    let registry = HttpRegistry::new(config_for(addr)).unwrap();

    registry.register("EchoService", "127.0.0.1:9001").await.unwrap();
    state.lock().unwrap().failing = true;

    // Must not panic or propagate.
    registry.unregister("EchoService", "127.0.0.1:9001").await;
    registry.stop().await;
}
