//! Wire codec for the coincidence telemetry protocol.
//!
//! Outgoing `configure` messages carry the raw group-spec text plus timing
//! parameters; the instrument parses the text into channel groupings itself.
//! Incoming `coincidence` payloads carry a status code, the elapsed report
//! interval, the server's echoed group ordering, and a parallel list of
//! rates. Positional correspondence between `groups[i]` and `rates[i]` is
//! the only linkage between the two arrays.

use serde_json::{Value, json};
use thiserror::Error;

use crate::config::SessionConfig;

/// Channel event name for outgoing configuration messages.
pub const EVENT_CONFIGURE: &str = "configure";
/// Channel event name for the server's configuration acknowledgement.
pub const EVENT_CONFIGURED: &str = "configured";
/// Channel event name for telemetry payloads.
pub const EVENT_COINCIDENCE: &str = "coincidence";

/// Status code the server uses for a successful telemetry report.
pub const STATUS_OK: i64 = 200;

/// One decoded telemetry report.
///
/// `group_keys` and `rates` are equal length: entries beyond the shorter of
/// the server's two arrays are dropped during decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Seconds elapsed since the previous report.
    pub elapsed_delta_secs: f64,
    /// Group labels in the server's echoed order, e.g. `"1,2"`.
    pub group_keys: Vec<String>,
    /// Counts per second, parallel to `group_keys`.
    pub rates: Vec<f64>,
}

/// Failure to decode a telemetry payload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The server reported an error status; its payload is carried verbatim.
    #[error("server reported error (status {status}): {message}")]
    RemoteReported { status: i64, message: String },
    /// A required field is missing or has the wrong type.
    #[error("missing or invalid field `{0}` in telemetry payload")]
    MissingField(&'static str),
}

/// Build the `configure` message payload from the current configuration.
///
/// The group-spec text passes through unchanged; the client does not
/// validate channel identifiers.
pub fn encode_configure(config: &SessionConfig) -> Value {
    json!({
        "groups": config.groups,
        "cwin": config.coincidence_window_ps,
        "rtime": config.report_interval_secs,
    })
}

/// Decode a `coincidence` payload into a [`TelemetryRecord`].
///
/// A non-success status yields [`DecodeError::RemoteReported`] carrying the
/// server's `error` field. On success the payload must contain a numeric
/// `rtime`, a `groups` list of integer lists, and a parallel `rates` list of
/// numbers. Group labels are rebuilt by comma-joining channel identifiers in
/// the server's order, which makes them byte-identical to the client-side
/// group keys used as series labels. A length mismatch between `groups` and
/// `rates` is truncated to the shorter length with a warning; no entry is
/// invented for the missing side.
pub fn decode_coincidence(data: &Value) -> Result<TelemetryRecord, DecodeError> {
    let status = data
        .get("status")
        .and_then(Value::as_i64)
        .ok_or(DecodeError::MissingField("status"))?;
    if status != STATUS_OK {
        let message = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unspecified server error")
            .to_string();
        return Err(DecodeError::RemoteReported { status, message });
    }

    let elapsed_delta_secs = data
        .get("rtime")
        .and_then(Value::as_f64)
        .ok_or(DecodeError::MissingField("rtime"))?;
    let groups = data
        .get("groups")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField("groups"))?;
    let rates = data
        .get("rates")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField("rates"))?;

    let len = groups.len().min(rates.len());
    if groups.len() != rates.len() {
        log::warn!(
            "telemetry groups/rates length mismatch ({} vs {}); truncating to {len}",
            groups.len(),
            rates.len(),
        );
    }

    let mut group_keys = Vec::with_capacity(len);
    let mut out_rates = Vec::with_capacity(len);
    for (group, rate) in groups.iter().zip(rates.iter()) {
        let ids = group
            .as_array()
            .ok_or(DecodeError::MissingField("groups"))?;
        let key = ids
            .iter()
            .map(|id| id.as_i64().map(|n| n.to_string()))
            .collect::<Option<Vec<_>>>()
            .ok_or(DecodeError::MissingField("groups"))?
            .join(",");
        let rate = rate.as_f64().ok_or(DecodeError::MissingField("rates"))?;
        group_keys.push(key);
        out_rates.push(rate);
    }

    Ok(TelemetryRecord {
        elapsed_delta_secs,
        group_keys,
        rates: out_rates,
    })
}
