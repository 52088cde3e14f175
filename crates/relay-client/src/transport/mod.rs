//! Network transports.
//!
//! A [`Transport`] carries one request to one instance and returns the
//! provider's response. Both implementations speak the same envelope; they
//! differ only in carrier: [`HttpTransport`] POSTs JSON to `/rpc`,
//! [`TcpTransport`] multiplexes binary frames over persistent connections.
//!
//! Every transport failure is a network-class [`relay_common::RpcError`],
//! which is what makes it visible to the retry loop and the circuit breaker.

use async_trait::async_trait;

use relay_common::protocol::{Request, Response, Result};

pub mod http;
pub mod tcp;

pub use http::HttpTransport;
pub use tcp::TcpTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` to the `host:port` instance and awaits its response.
    async fn send(&self, instance: &str, request: &Request) -> Result<Response>;
}
