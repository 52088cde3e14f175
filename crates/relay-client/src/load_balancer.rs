//! Instance selection strategies.

use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;

use relay_common::protocol::{ErrorCode, Result, RpcError};

/// Picks one instance from a non-empty candidate list.
pub trait LoadBalancer: Send + Sync {
    /// An empty candidate list is a caller bug and fails with
    /// `NO_AVAILABLE_INSTANCE` rather than panicking.
    fn choose(&self, instances: &[String]) -> Result<String>;
}

fn empty_input() -> RpcError {
    RpcError::framework(
        ErrorCode::NoAvailableInstance,
        "cannot choose from an empty instance list",
    )
}

/// Rotates through instances with a shared atomic counter.
///
/// The counter is read modulo the current list length, so a shrinking list
/// never indexes out of bounds; under concurrent callers the sequence is
/// fair but not strictly ordered.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    counter: AtomicI64,
}

impl RoundRobinLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn choose(&self, instances: &[String]) -> Result<String> {
        if instances.is_empty() {
            return Err(empty_input());
        }
        let tick = self.counter.fetch_add(1, Ordering::Relaxed);
        let index = (tick.unsigned_abs() as usize) % instances.len();
        Ok(instances[index].clone())
    }
}

/// Uniform random selection.
#[derive(Debug, Default)]
pub struct RandomLoadBalancer;

impl RandomLoadBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn choose(&self, instances: &[String]) -> Result<String> {
        if instances.is_empty() {
            return Err(empty_input());
        }
        let index = rand::rng().random_range(0..instances.len());
        Ok(instances[index].clone())
    }
}
