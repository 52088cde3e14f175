//! Poll-based registry client.
//!
//! Talks to a central registry server over four endpoints: `/reg`, `/unreg`,
//! `/findAll` and `/renews`, plus `/version` for cheap change detection.
//! Liveness is heartbeat-based: one background task renews every service this
//! process has registered in a single batched call. Discovery is poll-based:
//! subscriptions watch the per-service version number and re-fetch the list
//! only when it moves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_common::config::RegistryConfig;
use relay_common::protocol::{ErrorCode, Result, RpcError};

use crate::{ChangeListener, InstanceMeta, Registry};

struct Inner {
    config: RegistryConfig,
    client: reqwest::Client,
    /// service name -> the instance this process registered for it.
    registered: Mutex<HashMap<String, InstanceMeta>>,
    /// Last successfully fetched list per service, served when the registry
    /// server is unreachable.
    cache: Mutex<HashMap<String, Vec<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    heartbeat_running: AtomicBool,
}

impl Inner {
    /// Fetches the live list, falling back to the stale cache on any failure.
    async fn fetch_list(&self, service: &str) -> Vec<String> {
        let url = format!("{}/findAll", self.config.address);
        let response = self
            .client
            .get(&url)
            .query(&[("service", service)])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(service, error = %err, "findAll failed, serving cached list");
                return self.cached(service);
            }
        };

        match response.json::<Vec<InstanceMeta>>().await {
            Ok(metas) => {
                let list: Vec<String> = metas.iter().map(InstanceMeta::to_instance).collect();
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(service.to_string(), list.clone());
                }
                list
            }
            Err(err) => {
                warn!(service, error = %err, "findAll body unreadable, serving cached list");
                self.cached(service)
            }
        }
    }

    fn cached(&self, service: &str) -> Vec<String> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(service).cloned())
            .unwrap_or_default()
    }

    /// Current change-version for a service, or -1 when unavailable.
    async fn fetch_version(&self, service: &str) -> i64 {
        let url = format!("{}/version", self.config.address);
        let body = self
            .client
            .get(&url)
            .query(&[("service", service)])
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match body {
            Ok(response) => match response.text().await {
                Ok(text) => text.trim().parse().unwrap_or(-1),
                Err(_) => -1,
            },
            Err(_) => -1,
        }
    }

    /// One heartbeat pass: renews all registered services, batched per
    /// instance. Failures are logged and retried on the next tick.
    async fn renew_all(&self) {
        let snapshot: Vec<(String, InstanceMeta)> = match self.registered.lock() {
            Ok(registered) => registered
                .iter()
                .map(|(s, m)| (s.clone(), m.clone()))
                .collect(),
            Err(_) => return,
        };
        if snapshot.is_empty() {
            return;
        }

        // Group services sharing an instance into one /renews call.
        let mut by_instance: HashMap<String, (InstanceMeta, Vec<String>)> = HashMap::new();
        for (service, meta) in snapshot {
            by_instance
                .entry(meta.to_instance())
                .or_insert_with(|| (meta, Vec::new()))
                .1
                .push(service);
        }

        let url = format!("{}/renews", self.config.address);
        for (instance, (meta, mut services)) in by_instance {
            services.sort();
            let csv = services.join(",");
            let result = self
                .client
                .post(&url)
                .query(&[("services", csv.as_str())])
                .json(&meta)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => debug!(%instance, services = %csv, "renewed"),
                Err(err) => warn!(%instance, services = %csv, error = %err, "renew failed"),
            }
        }
    }
}

/// Registry client for the poll-based central registry server.
pub struct HttpRegistry {
    inner: Arc<Inner>,
}

impl HttpRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| RpcError::network(err.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                registered: Mutex::new(HashMap::new()),
                cache: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                heartbeat_running: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_heartbeat(&self) {
        if self.inner.heartbeat_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let interval = Duration::from_millis(inner.config.heartbeat_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick, renew starts next interval
            loop {
                ticker.tick().await;
                inner.renew_all().await;
            }
        });
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn start(&self) -> Result<()> {
        info!(address = %self.inner.config.address, "http registry ready");
        Ok(())
    }

    async fn stop(&self) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.inner.heartbeat_running.store(false, Ordering::SeqCst);
        info!("http registry stopped");
    }

    async fn register(&self, service: &str, instance: &str) -> Result<()> {
        let meta = InstanceMeta::from_instance(instance).ok_or_else(|| {
            RpcError::framework(
                ErrorCode::ProviderRegisterFailed,
                format!("malformed instance address {instance:?}"),
            )
        })?;

        let url = format!("{}/reg", self.inner.config.address);
        self.inner
            .client
            .post(&url)
            .query(&[("service", service)])
            .json(&meta)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| {
                RpcError::framework(ErrorCode::ProviderRegisterFailed, err.to_string())
            })?;

        if let Ok(mut registered) = self.inner.registered.lock() {
            registered.insert(service.to_string(), meta);
        }
        self.ensure_heartbeat();
        info!(service, instance, "registered");
        Ok(())
    }

    async fn unregister(&self, service: &str, instance: &str) {
        if let Ok(mut registered) = self.inner.registered.lock() {
            registered.remove(service);
        }
        let Some(meta) = InstanceMeta::from_instance(instance) else {
            warn!(service, instance, "unregister skipped, malformed instance");
            return;
        };
        let url = format!("{}/unreg", self.inner.config.address);
        let result = self
            .inner
            .client
            .post(&url)
            .query(&[("service", service)])
            .json(&meta)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => info!(service, instance, "unregistered"),
            Err(err) => warn!(service, instance, error = %err, "unregister failed"),
        }
    }

    async fn fetch_all(&self, service: &str) -> Result<Vec<String>> {
        Ok(self.inner.fetch_list(service).await)
    }

    async fn subscribe(&self, service: &str, listener: ChangeListener) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let service = service.to_string();
        let interval = Duration::from_millis(inner.config.poll_interval_ms);

        let mut last_version = inner.fetch_version(&service).await;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let version = inner.fetch_version(&service).await;
                if version >= 0 && version != last_version {
                    debug!(%service, last_version, version, "membership changed");
                    last_version = version;
                    let list = inner.fetch_list(&service).await;
                    listener(list);
                }
            }
        });
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
        Ok(())
    }
}
