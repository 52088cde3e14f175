//! End-to-end tests: provider and consumer wired through a shared
//! watch registry, over both server surfaces.

use std::sync::Arc;

use serde_json::json;

use relay_client::{ConsumerBootstrap, MethodDescriptor};
use relay_common::config::{ClientConfig, TransportKind};
use relay_common::protocol::ErrorCode;
use relay_common::RpcContext;
use relay_registry::watch::{TreeStore, WatchRegistry};
use relay_registry::Registry;
use relay_server::{Dispatcher, FrameServer, HttpServer, ProviderBootstrap, ServiceDef};

fn greeter() -> ServiceDef {
    ServiceDef::new("GreeterService")
        .method("hello", &[], |_, _| Ok(Some(json!("hello, world"))))
        .method("hello", &["java.lang.String", "int"], |_, args| {
            let name: String = serde_json::from_value(args[0].clone())?;
            let times: i32 = serde_json::from_value(args[1].clone())?;
            Ok(Some(json!(vec![name; times as usize].join(" "))))
        })
        .method("whoami", &[], |ctx, _| {
            Ok(Some(json!(ctx.gray_id().unwrap_or("nobody"))))
        })
}

fn client_config(transport: TransportKind) -> ClientConfig {
    ClientConfig {
        transport,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn tcp_end_to_end_with_overload_resolution() {
    let store = TreeStore::new();

    let registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(greeter());
    let server = FrameServer::bind(Arc::clone(&dispatcher), "127.0.0.1:0")
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    registry
        .register("GreeterService", &addr.to_string())
        .await
        .unwrap();

    let consumer_registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let bootstrap =
        ConsumerBootstrap::new(consumer_registry, client_config(TransportKind::Tcp)).unwrap();
    let proxy = bootstrap.service_ref("GreeterService").await.unwrap();

    let two_arg = MethodDescriptor::new("hello", &["java.lang.String", "int"]);
    assert_eq!(two_arg.sign, "hello@2_java.lang.String_int");
    let result = proxy
        .invoke(&two_arg, vec![json!("hi"), json!(2)], &RpcContext::new())
        .await
        .unwrap();
    assert_eq!(result, Some(json!("hi hi")));

    let zero_arg = MethodDescriptor::new("hello", &[]);
    let result = proxy
        .invoke(&zero_arg, vec![], &RpcContext::new())
        .await
        .unwrap();
    assert_eq!(result, Some(json!("hello, world")));
}

#[tokio::test]
async fn http_end_to_end() {
    let store = TreeStore::new();

    let registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(greeter());
    let server = HttpServer::bind(Arc::clone(&dispatcher), "127.0.0.1:0")
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    registry
        .register("GreeterService", &addr.to_string())
        .await
        .unwrap();

    let consumer_registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let bootstrap =
        ConsumerBootstrap::new(consumer_registry, client_config(TransportKind::Http)).unwrap();
    let proxy = bootstrap.service_ref("GreeterService").await.unwrap();

    let descriptor = MethodDescriptor::new("hello", &["java.lang.String", "int"]);
    let result = proxy
        .invoke(&descriptor, vec![json!("ho"), json!(3)], &RpcContext::new())
        .await
        .unwrap();
    assert_eq!(result, Some(json!("ho ho ho")));
}

#[tokio::test]
async fn both_surfaces_share_one_dispatcher() {
    let store = TreeStore::new();
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(greeter());

    let frame = FrameServer::bind(Arc::clone(&dispatcher), "127.0.0.1:0")
        .await
        .unwrap();
    let frame_addr = frame.local_addr().unwrap();
    tokio::spawn(frame.run());

    let http = HttpServer::bind(Arc::clone(&dispatcher), "127.0.0.1:0")
        .await
        .unwrap();
    let http_addr = http.local_addr().unwrap();
    tokio::spawn(http.run());

    // Separate envs so each consumer resolves the address for its carrier.
    let tcp_reg = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "tcp"));
    tcp_reg
        .register("GreeterService", &frame_addr.to_string())
        .await
        .unwrap();
    let http_reg = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "http"));
    http_reg
        .register("GreeterService", &http_addr.to_string())
        .await
        .unwrap();

    let descriptor = MethodDescriptor::new("hello", &[]);

    let tcp_consumer = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "tcp"));
    let tcp_proxy = ConsumerBootstrap::new(tcp_consumer, client_config(TransportKind::Tcp))
        .unwrap()
        .service_ref("GreeterService")
        .await
        .unwrap();
    assert_eq!(
        tcp_proxy
            .invoke(&descriptor, vec![], &RpcContext::new())
            .await
            .unwrap(),
        Some(json!("hello, world"))
    );

    let http_consumer = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "http"));
    let http_proxy = ConsumerBootstrap::new(http_consumer, client_config(TransportKind::Http))
        .unwrap()
        .service_ref("GreeterService")
        .await
        .unwrap();
    assert_eq!(
        http_proxy
            .invoke(&descriptor, vec![], &RpcContext::new())
            .await
            .unwrap(),
        Some(json!("hello, world"))
    );
}

#[tokio::test]
async fn gray_id_travels_and_does_not_leak_between_calls() {
    let store = TreeStore::new();

    let registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register(greeter());
    let server = FrameServer::bind(Arc::clone(&dispatcher), "127.0.0.1:0")
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    registry
        .register("GreeterService", &addr.to_string())
        .await
        .unwrap();

    let consumer_registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let bootstrap =
        ConsumerBootstrap::new(consumer_registry, client_config(TransportKind::Tcp)).unwrap();
    let proxy = bootstrap.service_ref("GreeterService").await.unwrap();

    let whoami = MethodDescriptor::new("whoami", &[]);

    let mut ctx = RpcContext::new();
    ctx.set_gray_id("user-42");
    assert_eq!(
        proxy.invoke(&whoami, vec![], &ctx).await.unwrap(),
        Some(json!("user-42"))
    );

    // Same connection, fresh context: nothing carries over.
    assert_eq!(
        proxy
            .invoke(&whoami, vec![], &RpcContext::new())
            .await
            .unwrap(),
        Some(json!("nobody"))
    );
}

#[tokio::test]
async fn provider_shutdown_withdraws_registrations() {
    let store = TreeStore::new();

    let registry = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    let provider = ProviderBootstrap::new(registry, "127.0.0.1:9999");
    provider.add_service(greeter());
    provider.start().await.unwrap();

    let observer = Arc::new(WatchRegistry::new(Arc::clone(&store), "app1", "dev"));
    assert_eq!(
        observer.fetch_all("GreeterService").await.unwrap(),
        vec!["127.0.0.1:9999"]
    );

    provider.shutdown().await;
    assert!(observer
        .fetch_all("GreeterService")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn consumer_with_no_provider_fails_with_no_available_instance() {
    let store = TreeStore::new();
    let consumer_registry = Arc::new(WatchRegistry::new(store, "app1", "dev"));
    let bootstrap =
        ConsumerBootstrap::new(consumer_registry, client_config(TransportKind::Tcp)).unwrap();
    let proxy = bootstrap.service_ref("GreeterService").await.unwrap();

    let err = proxy
        .invoke(
            &MethodDescriptor::new("hello", &[]),
            vec![],
            &RpcContext::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NoAvailableInstance));
}
