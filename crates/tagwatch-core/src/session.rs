//! Session controller: the state machine coordinating channel, codec, and
//! sliding window.
//!
//! States: `Idle → Connecting → Active → (Stopping) → Idle`. Transitions are
//! driven by discrete events only — user commands ([`start`], [`stop`],
//! [`update_config`]) and [`ChannelEvent`]s fed to [`handle_event`] — never
//! by re-evaluating derived conditions. All mutation happens inside these
//! synchronous methods, on whichever single thread owns the controller; the
//! transport's tasks communicate with it exclusively through the event
//! channel returned by [`SessionController::new`].
//!
//! [`start`]: SessionController::start
//! [`stop`]: SessionController::stop
//! [`update_config`]: SessionController::update_config
//! [`handle_event`]: SessionController::handle_event

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::{
    ChannelConnector, ChannelEvent, ChannelEventKind, ChannelHandle, Generation,
};
use crate::config::SessionConfig;
use crate::groups::has_groups;
use crate::window::SlidingWindow;
use crate::wire::{self, DecodeError, EVENT_COINCIDENCE, EVENT_CONFIGURE, EVENT_CONFIGURED};

/// Lifecycle state of one monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; buffer empty, no channel.
    Idle,
    /// Channel opened, awaiting the connect acknowledgement.
    Connecting,
    /// Configuration sent; telemetry is processed as it arrives.
    Active,
    /// Teardown in progress. Transient inside `stop()`.
    Stopping,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Session-scoped failure, surfaced for status display. Never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// No group keys parsable from the spec text; prevents start.
    #[error("no valid group keys in group spec {0:?}")]
    InvalidGroupSpec(String),
    /// The server rejected or failed a telemetry report; the message was
    /// discarded and the session continues.
    #[error("server reported error (status {status}): {message}")]
    RemoteReported { status: i64, message: String },
    /// The transport dropped; the session stays logically active while the
    /// transport retries.
    #[error("telemetry channel disconnected; awaiting transport reconnect")]
    ChannelDisconnected,
}

/// Coordinates one coincidence-monitoring session.
///
/// Owns at most one open channel at a time. The window's buffer is the sole
/// data source for the presentation layer, read through [`window`].
///
/// [`window`]: SessionController::window
pub struct SessionController<C: ChannelConnector> {
    connector: C,
    endpoint: String,
    config: SessionConfig,
    state: SessionState,
    window: SlidingWindow,
    channel: Option<Box<dyn ChannelHandle>>,
    generation: Generation,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    last_error: Option<SessionError>,
}

impl<C: ChannelConnector> SessionController<C> {
    /// Create an idle controller and the receiver its channels will deliver
    /// events on. The owner pumps that receiver into [`handle_event`].
    ///
    /// [`handle_event`]: SessionController::handle_event
    pub fn new(
        connector: C,
        endpoint: impl Into<String>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Self {
            connector,
            endpoint: endpoint.into(),
            config,
            state: SessionState::Idle,
            window: SlidingWindow::new(),
            channel: None,
            generation: 0,
            events_tx,
            last_error: None,
        };
        (controller, events_rx)
    }

    /// Begin a session: reset the window, open a channel, enter
    /// `Connecting`. Gated on at least one valid group key; a no-op when a
    /// session is already running.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            log::debug!("start ignored in state {}", self.state);
            return Ok(());
        }
        if !has_groups(&self.config.groups) {
            return Err(SessionError::InvalidGroupSpec(self.config.groups.clone()));
        }

        // Data must be empty before any telemetry can arrive.
        self.window.reset();
        self.last_error = None;
        self.generation += 1;
        let handle = self
            .connector
            .open(&self.endpoint, self.generation, self.events_tx.clone());
        self.channel = Some(handle);
        self.state = SessionState::Connecting;
        log::info!(
            "session {} connecting to {} with groups {:?}",
            self.generation,
            self.endpoint,
            self.config.groups
        );
        Ok(())
    }

    /// End the session: close the channel, clear the buffer and clock,
    /// return to `Idle`. Safe mid-connect; idempotent when already idle.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Stopping;
        self.teardown();
        self.state = SessionState::Idle;
        log::info!("session stopped");
    }

    /// Replace the session configuration.
    ///
    /// While `Active` with a connected channel and a non-empty group list,
    /// the new configuration is re-sent immediately over the open channel;
    /// the buffer and clock are untouched — only future telemetry framing
    /// changes. If the channel is down the change is deferred implicitly:
    /// the next connect reads whichever configuration is current. An empty
    /// group list while `Active` or `Connecting` stops the session.
    pub fn update_config(&mut self, config: SessionConfig) {
        self.config = config;

        if !has_groups(&self.config.groups) {
            if matches!(self.state, SessionState::Active | SessionState::Connecting) {
                log::info!("group spec emptied; stopping session");
                self.stop();
            }
            return;
        }

        if self.state == SessionState::Active
            && self.channel.as_ref().is_some_and(|ch| ch.is_connected())
        {
            self.send_configure();
        }
    }

    /// Process one channel event. Events carrying a stale generation come
    /// from a channel that has since been closed and are dropped, which is
    /// what guarantees no telemetry lands after `stop()`.
    pub fn handle_event(&mut self, event: ChannelEvent) {
        if event.generation != self.generation {
            log::trace!(
                "dropping event from stale channel generation {}",
                event.generation
            );
            return;
        }
        match event.kind {
            ChannelEventKind::Connected => self.on_connected(),
            ChannelEventKind::Message { event, data } => self.on_message(&event, data),
            ChannelEventKind::Disconnected => self.on_disconnected(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The aggregated time series. Sole data source for presentation.
    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Most recent session-scoped error, for status indication.
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    fn on_connected(&mut self) {
        match self.state {
            SessionState::Connecting => {
                log::info!("channel connected; sending initial configuration");
                self.send_configure();
                // Do not wait for the configured ack: telemetry may begin
                // arriving immediately and is processed normally.
                self.state = SessionState::Active;
            }
            SessionState::Active => {
                // Transport-level reconnect mid-session: the instrument has
                // lost our framing, so re-send the current configuration.
                log::info!("channel reconnected; re-sending configuration");
                self.last_error = None;
                self.send_configure();
            }
            _ => log::debug!("ignoring connect event in state {}", self.state),
        }
    }

    fn on_message(&mut self, event: &str, data: Value) {
        match event {
            EVENT_CONFIGURED => log::info!("server acknowledged configuration: {data}"),
            EVENT_COINCIDENCE => self.on_coincidence(&data),
            other => log::debug!("ignoring unknown channel event {other:?}"),
        }
    }

    fn on_coincidence(&mut self, data: &Value) {
        if self.state != SessionState::Active {
            log::debug!("dropping telemetry in state {}", self.state);
            return;
        }
        match wire::decode_coincidence(data) {
            Ok(record) => {
                let point = self.window.append(&record);
                log::trace!(
                    "appended point t={}s with {} series",
                    point.time_secs,
                    point.rates.len()
                );
                self.last_error = None;
            }
            Err(DecodeError::RemoteReported { status, message }) => {
                log::error!("server reported telemetry error (status {status}): {message}");
                self.last_error = Some(SessionError::RemoteReported { status, message });
            }
            Err(e) => log::warn!("dropping malformed telemetry: {e}"),
        }
    }

    fn on_disconnected(&mut self) {
        if matches!(self.state, SessionState::Active | SessionState::Connecting) {
            log::warn!("telemetry channel disconnected; transport will retry");
            self.last_error = Some(SessionError::ChannelDisconnected);
        }
    }

    fn send_configure(&mut self) {
        let Some(channel) = &self.channel else {
            return;
        };
        let data = wire::encode_configure(&self.config);
        if let Err(e) = channel.send(EVENT_CONFIGURE, data) {
            log::warn!("failed to send configuration: {e}");
        }
    }

    fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        // Invalidate events still in flight from the closed channel.
        self.generation += 1;
        self.window.reset();
        self.last_error = None;
    }
}

impl<C: ChannelConnector> Drop for SessionController<C> {
    fn drop(&mut self) {
        // Disposal mid-session (including mid-connect) must not leak an
        // open channel.
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }
}
