//! Pre/post call filters.
//!
//! Filters run around the whole invocation pipeline: `pre` in ascending
//! order before anything touches the network, `post` in descending order
//! after a response arrives. A `pre` that returns a response answers the
//! call locally and skips the rest of the pipeline including every `post`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use relay_common::protocol::{Request, Response};

pub trait Filter: Send + Sync {
    /// Returning `Some` short-circuits the call with that response.
    fn pre(&self, _request: &Request) -> Option<Response> {
        None
    }

    /// Observes the response of a call that went through the pipeline.
    fn post(&self, _request: &Request, _response: &Response) {}

    fn order(&self) -> i32 {
        0
    }
}

/// An ordered set of filters. Construction sorts once; `pre` walks
/// ascending, `post` walks descending.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(mut filters: Vec<Arc<dyn Filter>>) -> Self {
        filters.sort_by_key(|filter| filter.order());
        Self { filters }
    }

    pub fn pre(&self, request: &Request) -> Option<Response> {
        for filter in &self.filters {
            if let Some(response) = filter.pre(request) {
                return Some(response);
            }
        }
        None
    }

    pub fn post(&self, request: &Request, response: &Response) {
        for filter in self.filters.iter().rev() {
            filter.post(request, response);
        }
    }
}

/// Caches successful responses by service, signature and the canonical JSON
/// of the argument list. Failure responses are never cached.
pub struct CacheFilter {
    cache: Mutex<HashMap<String, Response>>,
}

impl CacheFilter {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn key(request: &Request) -> Option<String> {
        let args = serde_json::to_string(&request.args).ok()?;
        Some(format!(
            "{}#{}#{}",
            request.service, request.method_sign, args
        ))
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for CacheFilter {
    fn pre(&self, request: &Request) -> Option<Response> {
        let key = Self::key(request)?;
        let hit = self.cache.lock().ok()?.get(&key).cloned();
        if hit.is_some() {
            debug!(%key, "cache hit");
        }
        hit
    }

    fn post(&self, request: &Request, response: &Response) {
        if !response.status {
            return;
        }
        let Some(key) = Self::key(request) else {
            return;
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, response.clone());
        }
    }

    fn order(&self) -> i32 {
        10
    }
}

/// Answers calls with preset values by method signature, for testing a
/// consumer without any provider running.
pub struct MockFilter {
    mocks: Mutex<HashMap<String, Value>>,
}

impl MockFilter {
    pub fn new() -> Self {
        Self {
            mocks: Mutex::new(HashMap::new()),
        }
    }

    pub fn mock(&self, sign: impl Into<String>, value: Value) {
        if let Ok(mut mocks) = self.mocks.lock() {
            mocks.insert(sign.into(), value);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut mocks) = self.mocks.lock() {
            mocks.clear();
        }
    }
}

impl Default for MockFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for MockFilter {
    fn pre(&self, request: &Request) -> Option<Response> {
        let value = self
            .mocks
            .lock()
            .ok()?
            .get(&request.method_sign)
            .cloned()?;
        debug!(sign = %request.method_sign, "answering from mock");
        Some(Response::ok(value))
    }

    // Mocks run before everything else, cache included.
    fn order(&self) -> i32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(args: Vec<Value>) -> Request {
        Request::new("Echo", "say", "say@1_String", args)
    }

    #[test]
    fn cache_misses_then_hits() {
        let filter = CacheFilter::new();
        let req = request(vec![json!("hi")]);
        assert!(filter.pre(&req).is_none());

        filter.post(&req, &Response::ok(json!("HI")));
        let hit = filter.pre(&req).unwrap();
        assert_eq!(hit.data, Some(json!("HI")));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn cache_key_distinguishes_args() {
        let filter = CacheFilter::new();
        filter.post(&request(vec![json!("a")]), &Response::ok(json!("A")));
        assert!(filter.pre(&request(vec![json!("b")])).is_none());
    }

    #[test]
    fn failures_are_not_cached() {
        let filter = CacheFilter::new();
        let req = request(vec![json!("hi")]);
        filter.post(&req, &Response::error("SERVICE_NOT_FOUND: nope"));
        assert!(filter.pre(&req).is_none());
        assert!(filter.is_empty());
    }

    #[test]
    fn clear_empties_the_cache() {
        let filter = CacheFilter::new();
        let req = request(vec![json!("hi")]);
        filter.post(&req, &Response::ok(json!("HI")));
        filter.clear();
        assert!(filter.pre(&req).is_none());
    }

    #[test]
    fn mock_answers_by_signature() {
        let filter = MockFilter::new();
        filter.mock("say@1_String", json!("mocked"));

        let hit = filter.pre(&request(vec![json!("anything")])).unwrap();
        assert_eq!(hit.data, Some(json!("mocked")));

        let other = Request::new("Echo", "say", "say@0", vec![]);
        assert!(filter.pre(&other).is_none());

        filter.clear();
        assert!(filter.pre(&request(vec![json!("x")])).is_none());
    }

    #[test]
    fn chain_orders_pre_ascending() {
        let mock = Arc::new(MockFilter::new());
        mock.mock("say@1_String", json!("from mock"));
        let cache = Arc::new(CacheFilter::new());
        let req = request(vec![json!("hi")]);
        cache.post(&req, &Response::ok(json!("from cache")));

        // Mock (order 0) is consulted before cache (order 10) regardless of
        // construction order.
        let chain = FilterChain::new(vec![cache as Arc<dyn Filter>, mock as Arc<dyn Filter>]);
        let hit = chain.pre(&req).unwrap();
        assert_eq!(hit.data, Some(json!("from mock")));
    }
}
