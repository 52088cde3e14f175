//! Instance routing, applied before load balancing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use rand::Rng;
use tracing::debug;

/// Narrows the candidate instance list for one call. Routers run in
/// ascending [`order`](Router::order) and each receives the previous
/// router's output.
pub trait Router: Send + Sync {
    fn route(&self, instances: Vec<String>) -> Vec<String>;

    fn order(&self) -> i32 {
        0
    }
}

/// Gray-release router: sends `ratio` percent of calls to the marked
/// (gray) instances and the rest to the unmarked ones.
///
/// The split is statistical per call, not sticky per caller. When either
/// partition is empty the router steps aside and returns its input
/// unchanged, so a mark set that has drained never strands traffic.
pub struct GrayRouter {
    /// 0..=100.
    ratio: AtomicU8,
    marked: Mutex<HashSet<String>>,
}

impl GrayRouter {
    pub fn new(ratio: u8) -> Self {
        Self {
            ratio: AtomicU8::new(ratio.min(100)),
            marked: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_ratio(&self, ratio: u8) {
        self.ratio.store(ratio.min(100), Ordering::Relaxed);
    }

    pub fn mark(&self, instance: impl Into<String>) {
        if let Ok(mut marked) = self.marked.lock() {
            marked.insert(instance.into());
        }
    }

    pub fn unmark(&self, instance: &str) {
        if let Ok(mut marked) = self.marked.lock() {
            marked.remove(instance);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut marked) = self.marked.lock() {
            marked.clear();
        }
    }

    fn is_marked(&self, instance: &str) -> bool {
        self.marked
            .lock()
            .map(|marked| marked.contains(instance))
            .unwrap_or(false)
    }
}

impl Router for GrayRouter {
    fn route(&self, instances: Vec<String>) -> Vec<String> {
        let (gray, normal): (Vec<String>, Vec<String>) = instances
            .iter()
            .cloned()
            .partition(|instance| self.is_marked(instance));

        if gray.is_empty() || normal.is_empty() {
            return instances;
        }

        let ratio = self.ratio.load(Ordering::Relaxed);
        let roll = rand::rng().random_range(0..100u8);
        if roll < ratio {
            debug!(ratio, "routing to gray partition");
            gray
        } else {
            normal
        }
    }

    fn order(&self) -> i32 {
        100
    }
}
