// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex JSON-RPC connection over a framed byte stream.
//!
//! A writer task owns the outgoing half and a reader task owns the incoming
//! half. Host requests are correlated by a monotonically increasing id held
//! in a pending map. Plugin-initiated requests and notifications are handed to
//! the host API table; requests get a response written back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use quarry_core::{HostApiTable, PluginId, QuarryError};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::framing::{FrameCodec, Framing, FramingError};
use crate::protocol::{INTERNAL_ERROR, Inbound, JSONRPC_VERSION, RpcRequest, RpcResponse};

/// Framing and buffer parameters for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub framing: Framing,
    pub delimiter: Vec<u8>,
    pub read_chunk_size: usize,
}

impl ConnectionOptions {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            delimiter: crate::framing::DEFAULT_DELIMITER.to_vec(),
            read_chunk_size: 512,
        }
    }
}

type Reply = Result<Value, QuarryError>;
type PendingMap = DashMap<u64, oneshot::Sender<Reply>>;

/// Removes a pending entry when the waiting call goes away.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

pub struct RpcConnection {
    plugin: PluginId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl RpcConnection {
    /// Starts the reader and writer tasks. Must be called inside a tokio runtime.
    pub fn spawn<R, W>(
        plugin: PluginId,
        reader: R,
        writer: W,
        options: &ConnectionOptions,
        host: Arc<HostApiTable>,
    ) -> Result<Self, FramingError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let encoder = options.framing.codec(&options.delimiter)?;
        let decoder = options.framing.codec(&options.delimiter)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending: Arc<PendingMap> = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();
        let closed = CancellationToken::new();

        tokio::spawn(write_loop(
            plugin.clone(),
            writer,
            encoder,
            outbound_rx,
            shutdown.clone(),
        ));
        tokio::spawn(read_loop(ReadLoop {
            plugin: plugin.clone(),
            decoder,
            chunk_size: options.read_chunk_size.max(1),
            pending: Arc::clone(&pending),
            outbound: outbound.clone(),
            host,
            shutdown: shutdown.clone(),
            closed: closed.clone(),
        }, reader));

        Ok(Self {
            plugin,
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            shutdown,
            closed,
        })
    }

    /// Sends a request and waits for its response.
    ///
    /// Cancelling only discards the pending response; the plugin is not told.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<Value, QuarryError> {
        if self.closed.is_cancelled() {
            return Err(QuarryError::transport(&self.plugin, "connection is closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // The reader marks the connection closed before draining `pending`,
        // so an entry inserted after the drain is caught here.
        if self.closed.is_cancelled() {
            return Err(QuarryError::transport(&self.plugin, "connection is closed"));
        }

        let frame = serde_json::to_vec(&RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method,
            params: &params,
        })
        .map_err(|e| QuarryError::transport_with(&self.plugin, "failed to encode request", e))?;
        self.send(frame)?;
        trace!(plugin = %self.plugin, id, method, "request sent");

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(plugin = %self.plugin, id, method, "request cancelled, discarding response");
                Err(QuarryError::Cancelled)
            }
            reply = tokio::time::timeout(timeout, rx) => match reply {
                Err(_) => Err(QuarryError::Timeout { duration: timeout }),
                Ok(Err(_)) => Err(QuarryError::transport(&self.plugin, "connection closed before response")),
                Ok(Ok(reply)) => reply,
            },
        }
    }

    /// Sends a notification; no response is expected.
    pub fn notify(&self, method: &str, params: Value) -> Result<(), QuarryError> {
        let frame = serde_json::to_vec(&RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method,
            params: &params,
        })
        .map_err(|e| QuarryError::transport_with(&self.plugin, "failed to encode notification", e))?;
        self.send(frame)
    }

    fn send(&self, frame: Vec<u8>) -> Result<(), QuarryError> {
        self.outbound
            .send(frame)
            .map_err(|_| QuarryError::transport(&self.plugin, "connection is closed"))
    }

    /// Number of requests awaiting a response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the reader has stopped.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Stops both tasks after queued frames are written. Pending calls fail.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("plugin", &self.plugin)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop<W>(
    plugin: PluginId,
    mut writer: W,
    encoder: Box<dyn FrameCodec>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            biased;
            frame = frames.recv() => frame,
            _ = shutdown.cancelled() => None,
        };
        let Some(frame) = frame else {
            break;
        };
        let bytes = encoder.encode(&frame);
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!(plugin = %plugin, error = %e, "plugin input stream closed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

struct ReadLoop {
    plugin: PluginId,
    decoder: Box<dyn FrameCodec>,
    chunk_size: usize,
    pending: Arc<PendingMap>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    host: Arc<HostApiTable>,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

async fn read_loop<R>(mut state: ReadLoop, mut reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut chunk = vec![0u8; state.chunk_size];
    let reason = loop {
        let read = tokio::select! {
            _ = state.shutdown.cancelled() => break "connection closed by host".to_string(),
            read = reader.read(&mut chunk) => read,
        };
        let n = match read {
            Ok(0) => break "plugin output stream ended".to_string(),
            Ok(n) => n,
            Err(e) => break format!("failed to read plugin output: {e}"),
        };
        let payloads = match state.decoder.decode(&chunk[..n]) {
            Ok(payloads) => payloads,
            Err(e) => break format!("malformed frame from plugin: {e}"),
        };
        for payload in payloads {
            state.dispatch(&payload);
        }
    };

    debug!(plugin = %state.plugin, reason = %reason, "connection reader stopped");
    state.closed.cancel();
    let ids: Vec<u64> = state.pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = state.pending.remove(&id) {
            let _ = tx.send(Err(QuarryError::transport(&state.plugin, reason.clone())));
        }
    }
}

impl ReadLoop {
    fn dispatch(&self, payload: &[u8]) {
        if payload.iter().all(u8::is_ascii_whitespace) {
            trace!(plugin = %self.plugin, "skipping empty frame");
            return;
        }
        let message = match Inbound::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(plugin = %self.plugin, error = %e, "discarding malformed message from plugin");
                return;
            }
        };

        match message {
            Inbound::Response { id, outcome } => {
                let Some((_, tx)) = self.pending.remove(&id) else {
                    debug!(plugin = %self.plugin, id, "response for a request no longer pending");
                    return;
                };
                let reply = outcome.map_err(|error| QuarryError::PluginRuntime {
                    plugin: self.plugin.clone(),
                    code: error.code,
                    message: error.message,
                    data: error.data,
                });
                let _ = tx.send(reply);
            }
            Inbound::Notification { method, params } => {
                let host = Arc::clone(&self.host);
                let plugin = self.plugin.clone();
                tokio::spawn(async move {
                    if let Err(e) = host.dispatch(&plugin, &method, params).await {
                        warn!(plugin = %plugin, method = %method, error = %e, "host notification failed");
                    }
                });
            }
            Inbound::Request { id, method, params } => {
                let host = Arc::clone(&self.host);
                let plugin = self.plugin.clone();
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    let response = match host.dispatch(&plugin, &method, params).await {
                        Ok(value) => RpcResponse::success(id, value),
                        Err(e) => {
                            warn!(plugin = %plugin, method = %method, error = %e, "host request failed");
                            RpcResponse::failure(id, INTERNAL_ERROR, e.to_string())
                        }
                    };
                    match serde_json::to_vec(&response) {
                        Ok(frame) => {
                            let _ = outbound.send(frame);
                        }
                        Err(e) => warn!(plugin = %plugin, error = %e, "failed to encode host response"),
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{HostCall, HostHandler, HostMethod};
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, split};

    struct Peer {
        codec: Box<dyn FrameCodec>,
        queue: VecDeque<Vec<u8>>,
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn next(&mut self) -> Value {
            let mut chunk = [0u8; 64];
            loop {
                if let Some(frame) = self.queue.pop_front() {
                    return serde_json::from_slice(&frame).unwrap();
                }
                let n = self.reader.read(&mut chunk).await.unwrap();
                assert!(n > 0, "host closed the stream");
                self.queue.extend(self.codec.decode(&chunk[..n]).unwrap());
            }
        }

        async fn send(&mut self, value: Value) {
            let bytes = self.codec.encode(&serde_json::to_vec(&value).unwrap());
            self.writer.write_all(&bytes).await.unwrap();
        }
    }

    fn connect(framing: Framing, host: HostApiTable) -> (RpcConnection, Peer) {
        let (host_side, plugin_side) = tokio::io::duplex(4096);
        let (host_read, host_write) = split(host_side);
        let (plugin_read, plugin_write) = split(plugin_side);
        let mut options = ConnectionOptions::new(framing);
        options.read_chunk_size = 7;
        let connection =
            RpcConnection::spawn("p".into(), host_read, host_write, &options, Arc::new(host)).unwrap();
        let peer = Peer {
            codec: framing.codec(crate::framing::DEFAULT_DELIMITER).unwrap(),
            queue: VecDeque::new(),
            reader: plugin_read,
            writer: plugin_write,
        };
        (connection, peer)
    }

    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn request_round_trips_through_every_framing() {
        for framing in [
            Framing::LengthPrefixed,
            Framing::HeaderDelimited,
            Framing::Newline,
            Framing::Delimiter,
        ] {
            let (connection, mut peer) = connect(framing, HostApiTable::new());
            let cancel = CancellationToken::new();
            let call = connection.call("query", json!(["abc", {"k": 1}]), &cancel, LONG);
            let answer = async {
                let request = peer.next().await;
                assert_eq!(request["method"], "query");
                assert_eq!(request["params"], json!(["abc", {"k": 1}]));
                assert_eq!(request["jsonrpc"], "2.0");
                peer.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": [framing.to_string()]}))
                    .await;
            };
            let (reply, ()) = tokio::join!(call, answer);
            assert_eq!(reply.unwrap(), json!([framing.to_string()]));
            assert_eq!(connection.pending(), 0);
        }
    }

    #[tokio::test]
    async fn ids_increase_and_responses_match_out_of_order() {
        let (connection, mut peer) = connect(Framing::Newline, HostApiTable::new());
        let cancel = CancellationToken::new();
        let first = connection.call("a", json!([]), &cancel, LONG);
        let second = connection.call("b", json!([]), &cancel, LONG);
        let answer = async {
            let a = peer.next().await;
            let b = peer.next().await;
            assert!(b["id"].as_u64().unwrap() > a["id"].as_u64().unwrap());
            peer.send(json!({"jsonrpc": "2.0", "id": b["id"], "result": "b"})).await;
            peer.send(json!({"jsonrpc": "2.0", "id": a["id"], "result": "a"})).await;
        };
        let (a, b, ()) = tokio::join!(first, second, answer);
        assert_eq!(a.unwrap(), json!("a"));
        assert_eq!(b.unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn error_response_is_a_plugin_runtime_error() {
        let (connection, mut peer) = connect(Framing::LengthPrefixed, HostApiTable::new());
        let cancel = CancellationToken::new();
        let call = connection.call("query", json!([]), &cancel, LONG);
        let answer = async {
            let request = peer.next().await;
            peer.send(json!({"jsonrpc": "2.0", "id": request["id"], "error": {"code": 7, "message": "boom"}}))
                .await;
        };
        let (reply, ()) = tokio::join!(call, answer);
        assert!(matches!(reply, Err(QuarryError::PluginRuntime { code: 7, .. })));
    }

    #[tokio::test]
    async fn cancellation_discards_pending_response() {
        let (connection, mut peer) = connect(Framing::Newline, HostApiTable::new());
        let cancel = CancellationToken::new();
        let call = connection.call("slow", json!([]), &cancel, LONG);
        let trigger = async {
            let request = peer.next().await;
            cancel.cancel();
            request
        };
        let (reply, request) = tokio::join!(call, trigger);
        assert!(matches!(reply, Err(QuarryError::Cancelled)));
        assert_eq!(connection.pending(), 0);

        // A late answer is ignored and the connection keeps working.
        peer.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": 1})).await;
        let fresh = CancellationToken::new();
        let again = connection.call("fast", json!([]), &fresh, LONG);
        let answer = async {
            let request = peer.next().await;
            peer.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": 2})).await;
        };
        let (reply, ()) = tokio::join!(again, answer);
        assert_eq!(reply.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let (connection, _peer) = connect(Framing::Newline, HostApiTable::new());
        let reply = connection
            .call("never", json!([]), &CancellationToken::new(), Duration::from_millis(20))
            .await;
        assert!(matches!(reply, Err(QuarryError::Timeout { .. })));
        assert_eq!(connection.pending(), 0);
    }

    #[tokio::test]
    async fn closed_stream_fails_pending_calls() {
        let (connection, peer) = connect(Framing::Newline, HostApiTable::new());
        let cancel = CancellationToken::new();
        let call = connection.call("q", json!([]), &cancel, LONG);
        let hang_up = async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(peer);
        };
        let (reply, ()) = tokio::join!(call, hang_up);
        assert!(matches!(reply, Err(QuarryError::Transport { .. })));
        connection.closed().await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn calls_after_the_stream_ends_fail_fast() {
        let (connection, peer) = connect(Framing::Newline, HostApiTable::new());
        drop(peer);
        connection.closed().await;

        let cancel = CancellationToken::new();
        let reply = tokio::time::timeout(
            Duration::from_secs(1),
            connection.call("q", json!([]), &cancel, Duration::MAX),
        )
        .await
        .expect("a call on a closed connection must not wait");
        assert!(matches!(reply, Err(QuarryError::Transport { .. })));
        assert_eq!(connection.pending(), 0);
    }

    #[tokio::test]
    async fn plugin_requests_reach_the_host_table() {
        let host = HostApiTable::new().with(
            HostMethod::ActionKeywordAssigned,
            HostHandler::new(|call: HostCall| async move {
                Ok::<_, QuarryError>(json!(call.str_param(0)? == "g"))
            }),
        );
        let (_connection, mut peer) = connect(Framing::HeaderDelimited, host);
        peer.send(json!({"jsonrpc": "2.0", "id": "x", "method": "Quarry.ActionKeywordAssigned", "params": ["g"]}))
            .await;
        let response = peer.next().await;
        assert_eq!(response["id"], "x");
        assert_eq!(response["result"], json!(true));
    }
}
