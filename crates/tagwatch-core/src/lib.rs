//! # tagwatch-core
//!
//! Real-time coincidence-countrate telemetry client for photon-counting
//! time taggers.
//!
//! The crate owns the persistent connection to the instrument's coincidence
//! telemetry endpoint, pushes configuration changes, decodes labeled data
//! points from server reports, and maintains a bounded, time-ordered buffer
//! covering the trailing 15 seconds — everything a live plot needs, with the
//! plot itself left to the embedding application.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tagwatch_core::{SessionConfig, SessionController, TcpJsonConnector};
//!
//! # #[tokio::main] async fn main() {
//! let config = SessionConfig {
//!     groups: "1,2; 3,4".to_string(),
//!     ..SessionConfig::default()
//! };
//! let (mut controller, mut events) =
//!     SessionController::new(TcpJsonConnector::default(), "tagger:5003", config);
//! controller.start().unwrap();
//!
//! while let Some(event) = events.recv().await {
//!     controller.handle_event(event);
//!     if let Some(point) = controller.window().latest() {
//!         println!("t={}s {:?}", point.time_secs, point.rates);
//!     }
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! Channel → Codec → Window, coordinated by the session state machine:
//!
//! - [`channel`] — the transport seam ([`ChannelConnector`] /
//!   [`ChannelHandle`]) plus the concrete newline-delimited-JSON-over-TCP
//!   implementation with bounded reconnection.
//! - [`wire`] — encodes `configure` messages and decodes `coincidence`
//!   payloads into [`TelemetryRecord`]s, rebuilding group labels from the
//!   server's echoed channel groupings.
//! - [`window`] — the [`SlidingWindow`]: cumulative clock plus the bounded
//!   buffer of [`DataPoint`]s, evicted past the 15 s retention horizon.
//! - [`session`] — the [`SessionController`] state machine
//!   (`Idle`/`Connecting`/`Active`/`Stopping`) driving the above from
//!   discrete events on a single logical thread.

pub mod channel;
pub mod config;
pub mod groups;
pub mod session;
pub mod window;
pub mod wire;

pub use channel::{
    ChannelConnector, ChannelError, ChannelEvent, ChannelEventKind, ChannelHandle, Generation,
    TcpJsonConnector,
};
pub use config::{
    ConfigError, MAX_COINCIDENCE_WINDOW_PS, MAX_REPORT_INTERVAL_SECS, MIN_COINCIDENCE_WINDOW_PS,
    MIN_REPORT_INTERVAL_SECS, SessionConfig,
};
pub use groups::parse_group_spec;
pub use session::{SessionController, SessionError, SessionState};
pub use window::{DataPoint, RETENTION_SECS, SlidingWindow};
pub use wire::{DecodeError, TelemetryRecord, decode_coincidence, encode_configure};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
