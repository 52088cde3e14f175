//! Provider composition root.

use std::sync::Arc;

use tracing::{info, warn};

use relay_common::protocol::Result;
use relay_registry::Registry;

use crate::dispatcher::{Dispatcher, ServiceDef};

/// Wires service skeletons, the dispatcher and the registry.
///
/// Services are added first, then [`start`](ProviderBootstrap::start)
/// announces all of them under this provider's instance address. Shutdown is
/// best-effort: a dead registry cannot prevent the process from stopping.
pub struct ProviderBootstrap {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<dyn Registry>,
    /// `host:port` this provider is reachable at.
    instance: String,
}

impl ProviderBootstrap {
    pub fn new(registry: Arc<dyn Registry>, instance: impl Into<String>) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new()),
            registry,
            instance: instance.into(),
        }
    }

    /// The dispatcher shared with the server surfaces.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn add_service(&self, def: ServiceDef) {
        self.dispatcher.register(def);
    }

    /// Starts the registry and announces every added service. A registration
    /// failure propagates as `PROVIDER_REGISTER_FAILED`.
    pub async fn start(&self) -> Result<()> {
        self.registry.start().await?;
        for service in self.dispatcher.service_names() {
            self.registry.register(&service, &self.instance).await?;
        }
        info!(instance = %self.instance, "provider started");
        Ok(())
    }

    /// Withdraws every registration and stops the registry. Never fails.
    pub async fn shutdown(&self) {
        for service in self.dispatcher.service_names() {
            self.registry.unregister(&service, &self.instance).await;
        }
        self.registry.stop().await;
        warn!(instance = %self.instance, "provider stopped");
    }
}
