//! Service discovery for the relay RPC runtime.
//!
//! A [`Registry`] answers one question: which `host:port` instances currently
//! provide a named service. Two strategies are provided:
//!
//! - [`http::HttpRegistry`] polls a central registry server over HTTP and
//!   keeps registrations alive with heartbeat renewals.
//! - [`watch::WatchRegistry`] holds ephemeral entries in a hierarchical
//!   [`watch::TreeStore`] and pushes change events to subscribers; entries
//!   disappear when their owning session ends.
//!
//! Both strategies treat a service with zero instances as an empty list,
//! never an error, so consumers can start before their providers.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use relay_common::Result;

pub mod http;
pub mod watch;

/// Callback invoked with the full replacement instance list whenever a
/// subscribed service's membership changes.
pub type ChangeListener = Box<dyn Fn(Vec<String>) + Send + Sync>;

/// The discovery contract shared by both strategies.
///
/// Instances are opaque `host:port` strings; the registry does not interpret
/// them beyond identity.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Starts background work (heartbeats, watch pumps). Idempotent.
    async fn start(&self) -> Result<()>;

    /// Stops background work. Registrations owned by this registry are
    /// released according to the strategy's liveness rules.
    async fn stop(&self);

    /// Announces `instance` as a provider of `service`.
    async fn register(&self, service: &str, instance: &str) -> Result<()>;

    /// Withdraws `instance` from `service`. Best-effort: failures are logged,
    /// never propagated, so shutdown paths cannot wedge on a dead registry.
    async fn unregister(&self, service: &str, instance: &str);

    /// Current instance list for `service`.
    async fn fetch_all(&self, service: &str) -> Result<Vec<String>>;

    /// Invokes `listener` with the new full list on every detected
    /// membership change. May be called for many services concurrently.
    async fn subscribe(&self, service: &str, listener: ChangeListener) -> Result<()>;
}

/// Registration payload exchanged with the poll-based registry server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceMeta {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl InstanceMeta {
    /// Parses a `host:port` instance string. The scheme defaults to `http`.
    pub fn from_instance(instance: &str) -> Option<Self> {
        let (host, port) = instance.rsplit_once(':')?;
        Some(Self {
            scheme: "http".to_string(),
            host: host.to_string(),
            port: port.parse().ok()?,
            context: HashMap::new(),
        })
    }

    pub fn to_instance(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
