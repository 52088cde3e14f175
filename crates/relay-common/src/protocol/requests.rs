use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RpcContext;

/// The call envelope sent from a consumer to a provider.
///
/// `method_sign` disambiguates overloads on the provider side; arguments are
/// carried as opaque JSON values and coerced into concrete parameter types by
/// the dispatcher. Optional `context` entries carry cross-cutting metadata
/// (for example a gray-routing identity) without widening method parameters.
///
/// # Example
///
/// ```
/// use relay_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new(
///     "UserService",
///     "find_by_id",
///     "find_by_id@1_int",
///     vec![json!(42)],
/// );
/// assert_eq!(request.args.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub service: String,
    pub method: String,
    pub method_sign: String,
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, String>>,
}

impl Request {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        method_sign: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            method_sign: method_sign.into(),
            args,
            context: None,
        }
    }

    /// Attaches the call context's entries, omitting the map entirely when
    /// the context is empty.
    pub fn with_context(mut self, context: &RpcContext) -> Self {
        self.context = if context.is_empty() {
            None
        } else {
            Some(context.entries().clone())
        };
        self
    }
}
