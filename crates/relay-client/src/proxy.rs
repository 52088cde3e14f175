//! The invocation pipeline behind a typed service stub.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use relay_common::protocol::{build_sign, ErrorCode, Request, Response, Result, RpcError};
use relay_common::RpcContext;

use crate::breaker::CircuitBreaker;
use crate::filter::FilterChain;
use crate::load_balancer::LoadBalancer;
use crate::retry::RetryPolicy;
use crate::router::Router;
use crate::transport::Transport;

/// Maximum redraws when looking for an instance that has not failed yet in
/// the current call.
const MAX_SELECTION_DRAWS: usize = 10;

/// A stub method: its name plus the parameter type tokens it was declared
/// with. The signature string is computed once, at construction.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub sign: String,
}

impl MethodDescriptor {
    pub fn new(name: &str, param_types: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            sign: build_sign(name, param_types),
        }
    }
}

/// Consumer-side handle for one remote service.
///
/// Cloning is cheap; clones share the instance list, breaker and transport.
/// The instance list is replaced wholesale by registry subscription
/// callbacks and snapshotted per attempt, so a call never sees a
/// half-updated list.
#[derive(Clone)]
pub struct ServiceProxy {
    service: String,
    instances: Arc<RwLock<Vec<String>>>,
    filters: FilterChain,
    routers: Arc<Vec<Arc<dyn Router>>>,
    load_balancer: Arc<dyn LoadBalancer>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
}

impl ServiceProxy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: impl Into<String>,
        instances: Arc<RwLock<Vec<String>>>,
        filters: FilterChain,
        mut routers: Vec<Arc<dyn Router>>,
        load_balancer: Arc<dyn LoadBalancer>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        routers.sort_by_key(|router| router.order());
        Self {
            service: service.into(),
            instances,
            filters,
            routers: Arc::new(routers),
            load_balancer,
            breaker,
            retry,
            transport,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Replaces the instance list. Wired to the registry subscription by the
    /// composition root; also useful for static instance lists in tests.
    pub fn update_instances(&self, list: Vec<String>) {
        if let Ok(mut instances) = self.instances.write() {
            *instances = list;
        }
    }

    /// Invokes a stub method. `Ok(None)` is a void return.
    pub async fn invoke(
        &self,
        descriptor: &MethodDescriptor,
        args: Vec<Value>,
        ctx: &RpcContext,
    ) -> Result<Option<Value>> {
        let request = Request::new(
            self.service.clone(),
            descriptor.name.clone(),
            descriptor.sign.clone(),
            args,
        )
        .with_context(ctx);

        let response = self.call(request).await?;
        if response.status {
            Ok(response.data)
        } else {
            let message = response
                .error_message
                .unwrap_or_else(|| "unspecified provider failure".to_string());
            Err(RpcError::from_error_message(&message))
        }
    }

    /// Runs the full pipeline for one request and returns the raw response.
    pub async fn call(&self, request: Request) -> Result<Response> {
        // A filter answering locally skips everything below, post filters
        // included.
        if let Some(response) = self.filters.pre(&request) {
            return Ok(response);
        }

        self.breaker.pre_call()?;

        let mut tried: HashSet<String> = HashSet::new();
        let mut last_failure: Option<RpcError> = None;
        let attempts = self.retry.attempts();

        for attempt in 1..=attempts {
            let instance = self.pick_instance(&tried)?;
            debug!(service = %self.service, %instance, attempt, "sending request");

            match self.transport.send(&instance, &request).await {
                Ok(response) => {
                    // Any network-error-free completion counts as healthy,
                    // business failures included.
                    self.breaker.on_success();
                    self.filters.post(&request, &response);
                    return Ok(response);
                }
                Err(err) if err.is_network() => {
                    self.breaker.on_failure();
                    warn!(
                        service = %self.service,
                        %instance,
                        attempt,
                        error = %err,
                        "attempt failed"
                    );
                    tried.insert(instance);
                    last_failure = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let cause = last_failure
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown cause".to_string());
        Err(RpcError::network(format!(
            "all {attempts} attempts to {} failed, last error: {cause}",
            self.service
        )))
    }

    /// Routes the current instance snapshot and picks one target, preferring
    /// an instance that has not failed yet in this call.
    fn pick_instance(&self, tried: &HashSet<String>) -> Result<String> {
        let snapshot: Vec<String> = self
            .instances
            .read()
            .map(|instances| instances.clone())
            .unwrap_or_default();

        let mut routed = snapshot;
        for router in self.routers.iter() {
            routed = router.route(routed);
        }
        if routed.is_empty() {
            return Err(RpcError::framework(
                ErrorCode::NoAvailableInstance,
                format!("no available instance for service {}", self.service),
            ));
        }

        let mut choice = self.load_balancer.choose(&routed)?;
        if self.retry.switch_instance_on_retry && !tried.is_empty() {
            for _ in 0..MAX_SELECTION_DRAWS {
                if !tried.contains(&choice) {
                    break;
                }
                choice = self.load_balancer.choose(&routed)?;
            }
        }
        Ok(choice)
    }
}
