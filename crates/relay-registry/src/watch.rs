//! Watch-based registry over an in-process hierarchical store.
//!
//! The store keeps a flat map of paths to ephemeral children, each child
//! owned by a session. When a session ends its children vanish and watchers
//! of the affected paths are notified. This gives the push-based strategy's
//! contract (no heartbeats, membership follows process liveness) with the
//! namespace layout `/{app}_{env}_{service}` and children `{host}_{port}`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_common::protocol::{ErrorCode, Result, RpcError};

use crate::{ChangeListener, Registry};

const EVENT_CAPACITY: usize = 64;

/// Hierarchical store of ephemeral entries shared by cooperating registries.
///
/// Every child belongs to a session; [`TreeStore::expire_session`] removes all
/// of a session's children at once and fires a change event per affected
/// path. Watchers receive the path that changed, not the new list, and
/// re-read the children themselves.
pub struct TreeStore {
    /// path -> (child -> owning session id)
    nodes: Mutex<HashMap<String, HashMap<String, u64>>>,
    events: broadcast::Sender<String>,
    next_session: AtomicU64,
}

impl TreeStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            nodes: Mutex::new(HashMap::new()),
            events,
            next_session: AtomicU64::new(1),
        })
    }

    pub fn create_session(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Creates (or refreshes ownership of) an ephemeral child under `path`.
    pub fn create_ephemeral(&self, path: &str, child: &str, session: u64) {
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes
                .entry(path.to_string())
                .or_default()
                .insert(child.to_string(), session);
        }
        self.notify(path);
    }

    pub fn delete(&self, path: &str, child: &str) {
        let removed = match self.nodes.lock() {
            Ok(mut nodes) => nodes
                .get_mut(path)
                .map(|children| children.remove(child).is_some())
                .unwrap_or(false),
            Err(_) => false,
        };
        if removed {
            self.notify(path);
        }
    }

    /// Children of `path`; an absent path yields an empty list.
    pub fn children(&self, path: &str) -> Vec<String> {
        self.nodes
            .lock()
            .ok()
            .and_then(|nodes| nodes.get(path).map(|c| c.keys().cloned().collect()))
            .unwrap_or_default()
    }

    /// Removes every child owned by `session` and notifies watchers of each
    /// path that lost a child.
    pub fn expire_session(&self, session: u64) {
        let mut touched = Vec::new();
        if let Ok(mut nodes) = self.nodes.lock() {
            for (path, children) in nodes.iter_mut() {
                let before = children.len();
                children.retain(|_, owner| *owner != session);
                if children.len() != before {
                    touched.push(path.clone());
                }
            }
        }
        for path in touched {
            debug!(session, %path, "session expired, children removed");
            self.notify(path.as_str());
        }
    }

    pub fn watch(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    fn notify(&self, path: &str) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(path.to_string());
    }
}

/// Watch-based [`Registry`] with session-scoped ephemeral registrations.
pub struct WatchRegistry {
    store: Arc<TreeStore>,
    session: u64,
    app: String,
    env: String,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WatchRegistry {
    pub fn new(store: Arc<TreeStore>, app: impl Into<String>, env: impl Into<String>) -> Self {
        let session = store.create_session();
        Self {
            store,
            session,
            app: app.into(),
            env: env.into(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn service_path(&self, service: &str) -> String {
        format!("/{}_{}_{}", self.app, self.env, service)
    }

    /// `:` is path-illegal in the child name, so instances are stored as
    /// `host_port` and mapped back on read.
    fn to_child(instance: &str) -> String {
        instance.replace(':', "_")
    }

    fn from_child(child: &str) -> Option<String> {
        child
            .rsplit_once('_')
            .map(|(host, port)| format!("{host}:{port}"))
    }

    fn children_as_instances(store: &TreeStore, path: &str) -> Vec<String> {
        let mut instances: Vec<String> = store
            .children(path)
            .iter()
            .filter_map(|child| Self::from_child(child))
            .collect();
        instances.sort();
        instances
    }
}

#[async_trait]
impl Registry for WatchRegistry {
    async fn start(&self) -> Result<()> {
        info!(app = %self.app, env = %self.env, session = self.session, "watch registry ready");
        Ok(())
    }

    async fn stop(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.store.expire_session(self.session);
        info!(session = self.session, "watch registry stopped");
    }

    async fn register(&self, service: &str, instance: &str) -> Result<()> {
        if instance.rsplit_once(':').is_none() {
            return Err(RpcError::framework(
                ErrorCode::ProviderRegisterFailed,
                format!("malformed instance address {instance:?}"),
            ));
        }
        let path = self.service_path(service);
        self.store
            .create_ephemeral(&path, &Self::to_child(instance), self.session);
        info!(service, instance, %path, "registered");
        Ok(())
    }

    async fn unregister(&self, service: &str, instance: &str) {
        let path = self.service_path(service);
        self.store.delete(&path, &Self::to_child(instance));
        info!(service, instance, "unregistered");
    }

    async fn fetch_all(&self, service: &str) -> Result<Vec<String>> {
        let path = self.service_path(service);
        Ok(Self::children_as_instances(&self.store, &path))
    }

    async fn subscribe(&self, service: &str, listener: ChangeListener) -> Result<()> {
        let path = self.service_path(service);
        let store = Arc::clone(&self.store);
        let mut events = store.watch();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(changed) if changed == path => {
                        let list = Self::children_as_instances(&store, &path);
                        listener(list);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events collapse into one refresh.
                        warn!(%path, skipped, "watch lagged, refreshing");
                        let list = Self::children_as_instances(&store, &path);
                        listener(list);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
        Ok(())
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.store.expire_session(self.session);
    }
}
