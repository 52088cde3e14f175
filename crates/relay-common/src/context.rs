use std::collections::HashMap;

/// Context key carrying the caller's gray-routing identity.
pub const GRAY_ID: &str = "gray_id";

/// Explicit per-call metadata.
///
/// A context is created for a single invocation, threaded by value through
/// the filter and router chain, serialized into the outbound request, and
/// dropped when the call completes. Nothing survives a call boundary and
/// there is no ambient (thread-local) state to leak between calls.
#[derive(Debug, Clone, Default)]
pub struct RpcContext {
    entries: HashMap<String, String>,
}

impl RpcContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &HashMap<String, String> {
        &self.entries
    }

    /// Rebuilds a context from the map carried inside an inbound request.
    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn set_gray_id(&mut self, id: impl Into<String>) {
        self.set(GRAY_ID, id);
    }

    pub fn gray_id(&self) -> Option<&str> {
        self.get(GRAY_ID)
    }
}
