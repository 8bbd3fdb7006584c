//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// ```rust
/// use lattice_reactive::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json_str(r#"{ "retained_errors": 8 }"#).unwrap();
/// assert_eq!(config.retained_errors, 8);
/// assert!(config.log_reports);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of reported errors kept for `Runtime::take_errors`.
    /// Older reports are dropped first. Zero disables retention.
    pub retained_errors: usize,

    /// Emit a `tracing::error!` event for every reported failure.
    pub log_reports: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retained_errors: 64,
            log_reports: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ReactiveError> {
        serde_json::from_str(json).map_err(|e| ReactiveError::InvalidConfig(e.to_string()))
    }
}
