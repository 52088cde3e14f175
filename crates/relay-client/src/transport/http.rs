//! Text transport: JSON over HTTP.

use std::time::Duration;

use async_trait::async_trait;

use relay_common::protocol::{Request, Response, Result, RpcError};

use super::Transport;

/// POSTs the JSON envelope to `http://{instance}/rpc`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` bounds each request end to end.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|err| RpcError::network(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, instance: &str, request: &Request) -> Result<Response> {
        let url = format!("http://{instance}/rpc");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| RpcError::network(err.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|err| RpcError::network(err.to_string()))?;
        let response: Response = serde_json::from_slice(&body)?;
        Ok(response)
    }
}
