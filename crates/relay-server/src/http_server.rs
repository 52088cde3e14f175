//! HTTP server surface: the JSON envelope POSTed to `/rpc`.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use relay_common::protocol::{Request, Response, Result, RpcError};

use crate::dispatcher::Dispatcher;

type HttpRequest = hyper::Request<Incoming>;
type HttpResponse = hyper::Response<Full<Bytes>>;

pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn bind(dispatcher: Arc<Dispatcher>, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            dispatcher,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop: one http1 connection per task.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.listener.local_addr()?, "http server listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "connection accepted");
            let io = TokioIo::new(stream);
            let dispatcher = Arc::clone(&self.dispatcher);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move { handle_request(dispatcher, req).await }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(error = %err, "error serving connection");
                }
            });
        }
    }
}

async fn handle_request(
    dispatcher: Arc<Dispatcher>,
    req: HttpRequest,
) -> std::result::Result<HttpResponse, hyper::Error> {
    if req.method() != Method::POST || req.uri().path() != "/rpc" {
        return Ok(plain(StatusCode::NOT_FOUND, "not found"));
    }

    let body = req.into_body().collect().await?.to_bytes();
    let response = match serde_json::from_slice::<Request>(&body) {
        Ok(request) => dispatcher.invoke(&request),
        // A malformed envelope is still answered with the envelope.
        Err(err) => Response::error(RpcError::from(err).to_string()),
    };

    let payload = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
    let mut http_response = hyper::Response::new(Full::new(Bytes::from(payload)));
    http_response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(http_response)
}

fn plain(status: StatusCode, message: &'static str) -> HttpResponse {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}
