//! Session configuration for a coincidence-monitoring session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::groups::parse_group_spec;

/// Smallest accepted coincidence window, in picoseconds.
pub const MIN_COINCIDENCE_WINDOW_PS: u32 = 1000;
/// Largest accepted coincidence window, in picoseconds.
pub const MAX_COINCIDENCE_WINDOW_PS: u32 = 10_000;
/// Shortest accepted report interval, in seconds.
pub const MIN_REPORT_INTERVAL_SECS: f64 = 0.1;
/// Longest accepted report interval, in seconds.
pub const MAX_REPORT_INTERVAL_SECS: f64 = 5.0;

/// User-facing parameters of one monitoring session.
///
/// The group spec text is passed to the instrument unparsed; the client only
/// splits it into keys for labeling and for the at-least-one-group start
/// gate. Mutated by user input, read by the codec when building outgoing
/// configuration messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Raw group-spec text, e.g. `"1,2; 3,4"`.
    pub groups: String,
    /// Coincidence window in picoseconds.
    pub coincidence_window_ps: u32,
    /// Requested seconds between telemetry reports.
    pub report_interval_secs: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            groups: "1,2".to_string(),
            coincidence_window_ps: MIN_COINCIDENCE_WINDOW_PS,
            report_interval_secs: 1.0,
        }
    }
}

/// Validation failure for a [`SessionConfig`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no group keys parsable from {0:?}")]
    NoGroups(String),
    #[error(
        "coincidence window {0} ps outside {MIN_COINCIDENCE_WINDOW_PS}..={MAX_COINCIDENCE_WINDOW_PS}"
    )]
    CoincidenceWindowOutOfRange(u32),
    #[error(
        "report interval {0} s outside {MIN_REPORT_INTERVAL_SECS}..={MAX_REPORT_INTERVAL_SECS}"
    )]
    ReportIntervalOutOfRange(f64),
}

impl SessionConfig {
    /// Group keys parsed from the spec text, in input order.
    pub fn group_keys(&self) -> Vec<String> {
        parse_group_spec(&self.groups)
    }

    /// Whether at least one group key is present.
    pub fn has_groups(&self) -> bool {
        crate::groups::has_groups(&self.groups)
    }

    /// Check parameter ranges and that at least one group key parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_groups() {
            return Err(ConfigError::NoGroups(self.groups.clone()));
        }
        if !(MIN_COINCIDENCE_WINDOW_PS..=MAX_COINCIDENCE_WINDOW_PS)
            .contains(&self.coincidence_window_ps)
        {
            return Err(ConfigError::CoincidenceWindowOutOfRange(
                self.coincidence_window_ps,
            ));
        }
        if !(MIN_REPORT_INTERVAL_SECS..=MAX_REPORT_INTERVAL_SECS)
            .contains(&self.report_interval_secs)
        {
            return Err(ConfigError::ReportIntervalOutOfRange(
                self.report_interval_secs,
            ));
        }
        Ok(())
    }
}
