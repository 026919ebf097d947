//! Queue and flush configuration
//!
//! Options are plain serde structs so test suites can keep them in TOML
//! fixtures alongside their other configuration:
//!
//! ```toml
//! delivery_mode = "competing"
//! fail_fast = true
//! capture_errors = false
//! ```

use crate::queue::error::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum_macros::{Display, EnumString};

/// How a ready message is distributed among its matching consumers
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeliveryMode {
    /// Every matching consumer receives every matching message
    #[default]
    Broadcast,
    /// Matching consumers share messages; each goes to exactly one
    Competing,
}

impl DeliveryMode {
    pub fn parse(value: &str) -> QueueResult<Self> {
        value
            .parse()
            .map_err(|e: strum::ParseError| QueueError::Config {
                message: format!("unknown delivery mode '{value}': {e}"),
            })
    }
}

/// Construction-time options for a [`Queue`](crate::queue::Queue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueOptions {
    pub delivery_mode: DeliveryMode,
    /// Stop dispatching after the first handler failure in a flush
    pub fail_fast: bool,
    /// Report every handler failure from a flush instead of only the first
    pub capture_errors: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Broadcast,
            fail_fast: false,
            capture_errors: true,
        }
    }
}

impl QueueOptions {
    pub fn competing() -> Self {
        Self {
            delivery_mode: DeliveryMode::Competing,
            ..Self::default()
        }
    }

    pub fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_capture_errors(mut self, capture_errors: bool) -> Self {
        self.capture_errors = capture_errors;
        self
    }

    /// Parse options from TOML; missing keys take their defaults
    pub fn from_toml_str(contents: &str) -> QueueResult<Self> {
        toml::from_str(contents).map_err(|e| QueueError::Config {
            message: e.to_string(),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| QueueError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            QueueError::Config { message } => QueueError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }
}

/// Per-call overrides for `flush` and `drain`
///
/// Unset fields fall back to the queue's [`QueueOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushOptions {
    pub fail_fast: Option<bool>,
    pub capture_errors: Option<bool>,
}

impl FlushOptions {
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    pub fn capture_errors(mut self, capture_errors: bool) -> Self {
        self.capture_errors = Some(capture_errors);
        self
    }

    pub(crate) fn resolve(&self, defaults: &QueueOptions) -> (bool, bool) {
        (
            self.fail_fast.unwrap_or(defaults.fail_fast),
            self.capture_errors.unwrap_or(defaults.capture_errors),
        )
    }
}
