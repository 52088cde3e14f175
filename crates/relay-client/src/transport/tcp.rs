//! Binary transport: multiplexed frames over persistent TCP connections.
//!
//! One connection per instance address lives in a shared pool. Each
//! connection runs a reader task that feeds the resumable frame decoder and
//! completes pending calls by sequence id, so many calls can be in flight on
//! one socket at once. When a connection dies, every outstanding call on it
//! fails immediately with a network error and the connection is evicted; the
//! next send reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

use relay_common::protocol::{Request, Response, Result, RpcError};
use relay_common::wire::{self, Frame, FrameType};

use super::Transport;

type PendingTable = Mutex<HashMap<i32, oneshot::Sender<Result<Response>>>>;

struct Connection {
    writer: AsyncMutex<OwnedWriteHalf>,
    pending: PendingTable,
    alive: AtomicBool,
}

impl Connection {
    /// Completes every outstanding call with a network error and marks the
    /// connection dead.
    fn fail_all(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        let drained: Vec<oneshot::Sender<Result<Response>>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().map(|(_, tx)| tx).collect(),
            Err(_) => return,
        };
        for tx in drained {
            let _ = tx.send(Err(RpcError::network(reason.to_string())));
        }
    }
}

type Pool = AsyncMutex<HashMap<String, Arc<Connection>>>;

pub struct TcpTransport {
    pool: Arc<Pool>,
    sequence: AtomicI32,
    timeout: Duration,
}

impl TcpTransport {
    /// `timeout` bounds each call from send to matching response.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pool: Arc::new(AsyncMutex::new(HashMap::new())),
            sequence: AtomicI32::new(1),
            timeout,
        }
    }

    /// Returns the live pooled connection for `instance`, connecting if
    /// needed. The pool lock is held across the connect, so a stampede of
    /// callers still produces exactly one connection per address.
    async fn get_or_connect(&self, instance: &str) -> Result<Arc<Connection>> {
        let mut pool = self.pool.lock().await;
        if let Some(conn) = pool.get(instance) {
            if conn.alive.load(Ordering::SeqCst) {
                return Ok(Arc::clone(conn));
            }
        }

        let stream = TcpStream::connect(instance).await?;
        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Connection {
            writer: AsyncMutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
        });
        pool.insert(instance.to_string(), Arc::clone(&conn));
        tokio::spawn(read_loop(
            reader,
            Arc::clone(&conn),
            Arc::clone(&self.pool),
            instance.to_string(),
        ));
        debug!(instance, "connected");
        Ok(conn)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, instance: &str, request: &Request) -> Result<Response> {
        let payload = serde_json::to_vec(request)?;
        let conn = self.get_or_connect(instance).await?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        match conn.pending.lock() {
            Ok(mut pending) => {
                pending.insert(sequence, tx);
            }
            Err(_) => return Err(RpcError::network("pending table unavailable")),
        }

        let mut buf = BytesMut::new();
        wire::encode(&Frame::request(sequence, payload), &mut buf);
        {
            let mut writer = conn.writer.lock().await;
            if let Err(err) = writer.write_all(&buf).await {
                if let Ok(mut pending) = conn.pending.lock() {
                    pending.remove(&sequence);
                }
                conn.alive.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            // fail_all sends before dropping senders; a bare drop means the
            // entry was removed without completion.
            Ok(Err(_)) => Err(RpcError::network("connection closed before response")),
            Err(_) => {
                if let Ok(mut pending) = conn.pending.lock() {
                    pending.remove(&sequence);
                }
                Err(RpcError::network(format!(
                    "no response from {instance} within {:?}",
                    self.timeout
                )))
            }
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    conn: Arc<Connection>,
    pool: Arc<Pool>,
    instance: String,
) {
    let mut buf = BytesMut::with_capacity(4096);
    let reason = loop {
        match wire::decode(&mut buf) {
            Ok(Some(frame)) => {
                dispatch(&conn, frame);
                continue;
            }
            Ok(None) => {}
            // Desync is unrecoverable on a stream transport.
            Err(err) => break err.to_string(),
        }
        match reader.read_buf(&mut buf).await {
            Ok(0) => break "connection closed by peer".to_string(),
            Ok(_) => {}
            Err(err) => break err.to_string(),
        }
    };

    warn!(%instance, %reason, "connection lost, failing pending calls");
    conn.fail_all(&reason);

    let mut pool = pool.lock().await;
    if let Some(current) = pool.get(&instance) {
        if Arc::ptr_eq(current, &conn) {
            pool.remove(&instance);
        }
    }
}

fn dispatch(conn: &Connection, frame: Frame) {
    if frame.frame_type != FrameType::Response {
        return;
    }
    let sender = match conn.pending.lock() {
        Ok(mut pending) => pending.remove(&frame.sequence_id),
        Err(_) => None,
    };
    let Some(tx) = sender else {
        // Late response for a call that already timed out.
        debug!(sequence = frame.sequence_id, "dropping unmatched response");
        return;
    };
    let result = serde_json::from_slice::<Response>(&frame.payload).map_err(RpcError::from);
    let _ = tx.send(result);
}
