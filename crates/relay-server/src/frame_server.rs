//! Binary frame server.
//!
//! One task per connection reads frames through the resumable decoder; each
//! request frame is handled in its own task so slow handlers do not block
//! the connection, and the response frame echoes the request's sequence id.
//! Desync on the stream closes the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use relay_common::protocol::{Request, Response, Result, RpcError};
use relay_common::wire::{self, Frame, FrameType};

use crate::dispatcher::Dispatcher;

pub struct FrameServer {
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
}

impl FrameServer {
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

    /// Accept loop. Runs until the listener fails.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.listener.local_addr()?, "frame server listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "connection accepted");
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(handle_connection(dispatcher, stream));
        }
    }
}

async fn handle_connection(dispatcher: Arc<Dispatcher>, stream: TcpStream) {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        loop {
            match wire::decode(&mut buf) {
                Ok(Some(frame)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let writer = Arc::clone(&writer);
                    tokio::spawn(handle_frame(dispatcher, writer, frame));
                }
                Ok(None) => break,
                Err(err) => {
                    // The stream cannot be trusted after a framing error.
                    warn!(error = %err, "closing desynchronized connection");
                    return;
                }
            }
        }
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("connection closed by peer");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "read failed, closing connection");
                return;
            }
        }
    }
}

async fn handle_frame(
    dispatcher: Arc<Dispatcher>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    frame: Frame,
) {
    if frame.frame_type != FrameType::Request {
        warn!(sequence = frame.sequence_id, "ignoring non-request frame");
        return;
    }

    let response = match serde_json::from_slice::<Request>(&frame.payload) {
        Ok(request) => dispatcher.invoke(&request),
        Err(err) => Response::error(RpcError::from(err).to_string()),
    };

    let payload = match serde_json::to_vec(&response) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "response not serializable");
            return;
        }
    };

    let mut out = BytesMut::new();
    wire::encode(&Frame::response(frame.sequence_id, payload), &mut out);
    if let Err(err) = writer.lock().await.write_all(&out).await {
        warn!(error = %err, "failed to write response frame");
    }
}
