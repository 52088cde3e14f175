//! Consumer composition root.

use std::sync::{Arc, RwLock};

use tracing::info;

use relay_common::config::{ClientConfig, LbStrategy, TransportKind};
use relay_common::protocol::{ErrorCode, Result, RpcError};
use relay_registry::Registry;

use crate::breaker::CircuitBreaker;
use crate::filter::{Filter, FilterChain};
use crate::load_balancer::{LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer};
use crate::proxy::ServiceProxy;
use crate::retry::RetryPolicy;
use crate::router::{GrayRouter, Router};
use crate::transport::{HttpTransport, TcpTransport, Transport};

/// Wires registry, filters, routers and transport into [`ServiceProxy`]
/// handles. All wiring is explicit; nothing is discovered at runtime.
pub struct ConsumerBootstrap {
    registry: Arc<dyn Registry>,
    config: ClientConfig,
    filters: Vec<Arc<dyn Filter>>,
    routers: Vec<Arc<dyn Router>>,
    transport: Arc<dyn Transport>,
}

impl ConsumerBootstrap {
    pub fn new(registry: Arc<dyn Registry>, config: ClientConfig) -> Result<Self> {
        let retry = RetryPolicy::from(&config.retry);
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::Http => Arc::new(HttpTransport::new(retry.timeout)?),
            TransportKind::Tcp => Arc::new(TcpTransport::new(retry.timeout)),
        };
        Ok(Self {
            registry,
            config,
            filters: Vec::new(),
            routers: Vec::new(),
            transport,
        })
    }

    /// Replaces the config-selected transport, mainly for tests.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.routers.push(router);
        self
    }

    /// Builds a wired proxy for `service`: fetches the initial instance
    /// list, subscribes for whole-list replacement, and assembles the
    /// pipeline from this bootstrap's configuration.
    pub async fn service_ref(&self, service: &str) -> Result<ServiceProxy> {
        let initial = self
            .registry
            .fetch_all(service)
            .await
            .map_err(|err| inject_failure(service, err))?;
        let instances = Arc::new(RwLock::new(initial));

        let shared = Arc::clone(&instances);
        self.registry
            .subscribe(
                service,
                Box::new(move |list| {
                    if let Ok(mut guard) = shared.write() {
                        *guard = list;
                    }
                }),
            )
            .await
            .map_err(|err| inject_failure(service, err))?;

        let load_balancer: Arc<dyn LoadBalancer> = match self.config.load_balancer {
            LbStrategy::RoundRobin => Arc::new(RoundRobinLoadBalancer::new()),
            LbStrategy::Random => Arc::new(RandomLoadBalancer::new()),
        };

        let mut routers = self.routers.clone();
        if self.config.gray_ratio > 0 {
            routers.push(Arc::new(GrayRouter::new(self.config.gray_ratio)));
        }

        info!(service, "service reference wired");
        Ok(ServiceProxy::new(
            service,
            instances,
            FilterChain::new(self.filters.clone()),
            routers,
            load_balancer,
            Arc::new(CircuitBreaker::new(self.config.circuit_breaker.clone())),
            RetryPolicy::from(&self.config.retry),
            Arc::clone(&self.transport),
        ))
    }
}

fn inject_failure(service: &str, err: RpcError) -> RpcError {
    RpcError::framework(
        ErrorCode::ConsumerInjectFailed,
        format!("failed to wire service {service}: {err}"),
    )
}
