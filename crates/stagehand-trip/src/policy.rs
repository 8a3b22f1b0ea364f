//! Policy-as-data for trip handling.
//!
//! A [`Policy`] decides when a session must stop (`stop_on_fall`,
//! `max_stumbles`), which trip kinds are considered recoverable, and how
//! retries are paced per trip kind. Policies load from TOML or JSON:
//!
//! ```toml
//! stop_on_fall = true
//! max_stumbles = 5
//! recoverable_types = ["visual", "timing"]
//!
//! [retry_policy.visual]
//! max_retries = 3
//! backoff_ms = 100
//! exponential = false
//! ```
//!
//! Fields left out of the file keep their [`Policy::default`] values.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on a single exponential backoff step.
const MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse policy TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse policy JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retry pacing for one trip kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = a single attempt).
    pub max_retries: u32,
    /// Base delay between attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Double the delay on every retry instead of keeping it fixed.
    pub exponential: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
            exponential: false,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_retries: u32, backoff_ms: u64, exponential: bool) -> Self {
        Self {
            max_retries,
            backoff_ms,
            exponential,
        }
    }

    /// Delay before retry `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return Duration::from_millis(self.backoff_ms);
        }
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.backoff_ms.saturating_mul(multiplier);
        Duration::from_millis(delay.min(MAX_BACKOFF_MS))
    }

    /// Sum of every delay a fully exhausted retry loop would sleep.
    #[must_use]
    pub fn total_max_delay(&self) -> Duration {
        (0..self.max_retries).map(|i| self.delay(i)).sum()
    }
}

/// How a [`Handler`](crate::Handler) treats the trips it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Any recorded fall makes [`should_continue`](crate::Handler::should_continue) false.
    pub stop_on_fall: bool,
    /// More stumbles than this makes the session stop (0 disables the limit).
    pub max_stumbles: usize,
    /// Trip kinds that callers may retry or tolerate.
    pub recoverable_types: BTreeSet<String>,
    /// Retry pacing keyed by trip kind.
    pub retry_policy: BTreeMap<String, RetryConfig>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            stop_on_fall: true,
            max_stumbles: 10,
            recoverable_types: ["visual", "interaction", "timing"]
                .into_iter()
                .map(String::from)
                .collect(),
            retry_policy: BTreeMap::from([
                ("visual".to_string(), RetryConfig::new(3, 100, false)),
                ("interaction".to_string(), RetryConfig::new(2, 50, true)),
                ("timing".to_string(), RetryConfig::new(1, 25, false)),
            ]),
        }
    }
}

impl Policy {
    /// A policy that never stops the session and retries nothing.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            stop_on_fall: false,
            max_stumbles: 0,
            recoverable_types: BTreeSet::new(),
            retry_policy: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_stop_on_fall(mut self, stop: bool) -> Self {
        self.stop_on_fall = stop;
        self
    }

    #[must_use]
    pub fn with_max_stumbles(mut self, max: usize) -> Self {
        self.max_stumbles = max;
        self
    }

    #[must_use]
    pub fn with_recoverable(mut self, kind: impl Into<String>) -> Self {
        self.recoverable_types.insert(kind.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, kind: impl Into<String>, config: RetryConfig) -> Self {
        self.retry_policy.insert(kind.into(), config);
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(s)?)
    }
}
