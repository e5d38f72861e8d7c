//! Channel client: the seam to the pub/sub transport.
//!
//! A channel is one persistent bidirectional connection to a named telemetry
//! endpoint, delivering structured event messages in both directions. The
//! session controller talks to channels only through the
//! [`ChannelConnector`] / [`ChannelHandle`] traits; incoming traffic arrives
//! as [`ChannelEvent`]s on a tokio mpsc channel, which keeps all controller
//! mutation on a single logical thread.
//!
//! [`TcpJsonConnector`] is the concrete transport: newline-delimited JSON
//! envelopes `{"event": ..., "data": ...}` over TCP, with automatic
//! reconnection under a bounded retry budget. Opening a channel spawns its
//! I/O task, so the connector must be used inside a tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Monotonic counter distinguishing successive channel openings of one
/// controller. Events from a closed channel carry a stale generation and
/// are dropped by the receiver.
pub type Generation = u64;

/// One event delivered by an open channel.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub generation: Generation,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Clone)]
pub enum ChannelEventKind {
    /// The connection (initial or after transport-level reconnect) is up.
    Connected,
    /// A structured message arrived.
    Message { event: String, data: Value },
    /// The connection dropped; the transport may still retry.
    Disconnected,
}

/// Transport-level failure on an open channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("channel is closed")]
    Closed,
    #[error("failed to serialize outgoing message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An open channel owned by a session controller.
pub trait ChannelHandle: Send {
    /// Queue a structured message for sending. Never blocks; delivery order
    /// matches call order.
    fn send(&self, event: &str, data: Value) -> Result<(), ChannelError>;

    /// Whether the underlying connection is currently up.
    fn is_connected(&self) -> bool;

    /// Tear the channel down. After this returns, no further events from
    /// this channel are emitted. Safe to call mid-connect and repeatedly.
    fn close(&mut self);
}

/// Opens channels against named endpoints.
pub trait ChannelConnector {
    /// Open a channel to `endpoint`, tagging every emitted event with
    /// `generation` and delivering it on `events`.
    fn open(
        &self,
        endpoint: &str,
        generation: Generation,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Box<dyn ChannelHandle>;
}

/// Newline-delimited JSON over TCP with bounded reconnection.
#[derive(Debug, Clone)]
pub struct TcpJsonConnector {
    /// Consecutive failed connect attempts before the channel gives up.
    /// Resets after every successful connection.
    attempts: u32,
    /// Delay between attempts, and before a reconnect after a drop.
    retry_delay: Duration,
}

impl Default for TcpJsonConnector {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

impl TcpJsonConnector {
    pub fn new(attempts: u32, retry_delay: Duration) -> Self {
        Self {
            attempts,
            retry_delay,
        }
    }
}

impl ChannelConnector for TcpJsonConnector {
    fn open(
        &self,
        endpoint: &str,
        generation: Generation,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Box<dyn ChannelHandle> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_channel(
            endpoint.to_string(),
            generation,
            self.attempts,
            self.retry_delay,
            events,
            Arc::clone(&connected),
            outgoing_rx,
        ));
        Box::new(TcpJsonChannel {
            outgoing: outgoing_tx,
            connected,
            task,
            closed: false,
        })
    }
}

struct TcpJsonChannel {
    outgoing: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl ChannelHandle for TcpJsonChannel {
    fn send(&self, event: &str, data: Value) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }
        let line = serde_json::to_string(&json!({ "event": event, "data": data }))?;
        self.outgoing.send(line).map_err(|_| ChannelError::Closed)
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.connected.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.connected.store(false, Ordering::SeqCst);
        // Aborting the I/O task drops its event sender, so nothing is
        // emitted after close returns.
        self.task.abort();
    }
}

impl Drop for TcpJsonChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse one incoming line into an `(event, data)` pair. Lines that are not
/// JSON envelopes are reported as `None` and skipped by the reader.
fn parse_envelope(line: &str) -> Option<(String, Value)> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("dropping unparsable channel line: {e}");
            return None;
        }
    };
    let Some(event) = value.get("event").and_then(Value::as_str) else {
        log::warn!("dropping channel line without event field");
        return None;
    };
    let data = value.get("data").cloned().unwrap_or(Value::Null);
    Some((event.to_string(), data))
}

/// Connection loop: connect with bounded retry, then pump lines in and
/// queued messages out until the connection drops or the handle is closed.
async fn run_channel(
    endpoint: String,
    generation: Generation,
    attempts: u32,
    retry_delay: Duration,
    events: mpsc::UnboundedSender<ChannelEvent>,
    connected: Arc<AtomicBool>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let emit = |kind: ChannelEventKind| events.send(ChannelEvent { generation, kind }).is_ok();

    let mut failures = 0u32;
    loop {
        let stream = match TcpStream::connect(&endpoint).await {
            Ok(stream) => stream,
            Err(e) => {
                failures += 1;
                if failures >= attempts {
                    log::warn!(
                        "giving up on {endpoint} after {failures} failed connect attempts: {e}"
                    );
                    let _ = emit(ChannelEventKind::Disconnected);
                    return;
                }
                log::debug!("connect to {endpoint} failed (attempt {failures}/{attempts}): {e}");
                tokio::time::sleep(retry_delay).await;
                continue;
            }
        };
        failures = 0;
        connected.store(true, Ordering::SeqCst);
        if !emit(ChannelEventKind::Connected) {
            return;
        }

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        loop {
            tokio::select! {
                incoming = lines.next_line() => match incoming {
                    Ok(Some(line)) => {
                        if let Some((event, data)) = parse_envelope(&line)
                            && !emit(ChannelEventKind::Message { event, data })
                        {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::debug!("channel read error on {endpoint}: {e}");
                        break;
                    }
                },
                queued = outgoing.recv() => match queued {
                    Some(line) => {
                        if write_half.write_all(line.as_bytes()).await.is_err()
                            || write_half.write_all(b"\n").await.is_err()
                        {
                            break;
                        }
                    }
                    // Handle dropped without close: nothing left to do.
                    None => return,
                },
            }
        }

        connected.store(false, Ordering::SeqCst);
        if !emit(ChannelEventKind::Disconnected) {
            return;
        }
        log::debug!("connection to {endpoint} dropped; retrying");
        tokio::time::sleep(retry_delay).await;
    }
}
