//! Method dispatch: service skeletons and overload resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use relay_common::protocol::{arg_count_of, build_sign, ErrorCode, Request, Response, Result, RpcError};
use relay_common::RpcContext;

/// A registered method body. Handlers coerce their own arguments from JSON
/// values (`serde_json::from_value`) and return `Ok(None)` for void methods.
/// Any error becomes a failure response; handlers cannot break the
/// transport.
pub type Handler = Arc<dyn Fn(&RpcContext, Vec<Value>) -> Result<Option<Value>> + Send + Sync>;

struct MethodEntry {
    name: String,
    sign: String,
    arg_count: usize,
    handler: Handler,
}

/// The skeleton for one service: its methods, addressable by signature.
pub struct ServiceDef {
    name: String,
    methods: Vec<MethodEntry>,
}

impl ServiceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a method overload. The signature is computed from the
    /// declared parameter type tokens, which must match what the consumer's
    /// stub declares.
    pub fn method<F>(mut self, name: &str, param_types: &[&str], handler: F) -> Self
    where
        F: Fn(&RpcContext, Vec<Value>) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        let sign = build_sign(name, param_types);
        self.methods.push(MethodEntry {
            name: name.to_string(),
            arg_count: arg_count_of(&sign),
            sign,
            handler: Arc::new(handler),
        });
        self
    }

    /// Exact signature match first, then unique-enough fallback by name and
    /// argument count.
    fn resolve(&self, method: &str, sign: &str, arg_count: usize) -> Option<&MethodEntry> {
        if let Some(entry) = self.methods.iter().find(|entry| entry.sign == sign) {
            return Some(entry);
        }
        self.methods
            .iter()
            .find(|entry| entry.name == method && entry.arg_count == arg_count)
    }
}

/// Routes inbound requests to service skeletons. Shared by every server
/// surface of a provider.
#[derive(Default)]
pub struct Dispatcher {
    services: RwLock<HashMap<String, ServiceDef>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: ServiceDef) {
        info!(service = %def.name, methods = def.methods.len(), "service registered");
        if let Ok(mut services) = self.services.write() {
            services.insert(def.name.clone(), def);
        }
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services
            .read()
            .map(|services| services.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Handles one request. Every failure mode is a well-formed failure
    /// response; this function never errors.
    pub fn invoke(&self, request: &Request) -> Response {
        let services = match self.services.read() {
            Ok(services) => services,
            Err(_) => {
                return Response::error(
                    RpcError::business(ErrorCode::ServiceNotFound, "dispatcher unavailable")
                        .to_string(),
                )
            }
        };

        let Some(service) = services.get(&request.service) else {
            warn!(service = %request.service, "unknown service");
            return Response::error(
                RpcError::business(
                    ErrorCode::ServiceNotFound,
                    format!("no service named {}", request.service),
                )
                .to_string(),
            );
        };

        // The fallback count comes from the signature string, not from the
        // payload; a malformed sign counts as zero-arg.
        let Some(entry) = service.resolve(
            &request.method,
            &request.method_sign,
            arg_count_of(&request.method_sign),
        ) else {
            warn!(service = %request.service, sign = %request.method_sign, "unknown method");
            return Response::error(
                RpcError::business(
                    ErrorCode::MethodNotFound,
                    format!(
                        "no method matching {} on {}",
                        request.method_sign, request.service
                    ),
                )
                .to_string(),
            );
        };

        debug!(service = %request.service, sign = %entry.sign, "dispatching");
        let ctx = RpcContext::from_entries(request.context.clone().unwrap_or_default());
        match (entry.handler)(&ctx, request.args.clone()) {
            Ok(Some(value)) => Response::ok(value),
            Ok(None) => Response::ok_empty(),
            Err(err) => Response::error(err.to_string()),
        }
    }
}
