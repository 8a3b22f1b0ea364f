//! Stage director configuration.
//!
//! # Sources
//!
//! - [`StageConfig::default`]: 30s timeout, 10ms typing delay, snapshots on.
//! - [`StageConfig::from_env`]: defaults overridden by `STAGEHAND_*` variables.
//! - [`StageConfig::from_toml_str`] / [`StageConfig::from_json_str`]: config
//!   files, durations in integer milliseconds:
//!
//! ```toml
//! timeout_ms = 5000
//! typing_delay_ms = 0
//! capture_views = false
//! search_markers = ["Found", "matches"]
//! ```
//!
//! Every source ends in [`StageConfig::validated`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Largest accepted poll interval.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunables for one stage session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Upper bound for `wait_for_*` calls and the startup readiness gate.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Pause after every typed character (zero for fast deterministic runs).
    #[serde(rename = "typing_delay_ms", with = "duration_ms")]
    pub typing_delay: Duration,
    /// Append a snapshot after interactions and waits.
    pub capture_views: bool,
    /// Upper bound on retries for any retried operation.
    pub max_retries: u32,
    /// How long an interaction waits for the view to react.
    #[serde(rename = "view_change_timeout_ms", with = "duration_ms")]
    pub view_change_timeout: Duration,
    /// Interval between predicate checks in waits.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Slots in the model update queue.
    pub queue_capacity: usize,
    /// Substrings that mark a rendered search result.
    pub search_markers: Vec<String>,
    /// Named condition that also counts as "results shown".
    pub search_condition: String,
    /// Pause after results appear so they can settle.
    #[serde(rename = "search_settle_ms", with = "duration_ms")]
    pub search_settle: Duration,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            typing_delay: Duration::from_millis(10),
            capture_views: true,
            max_retries: 3,
            view_change_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
            queue_capacity: 50,
            search_markers: vec!["Live Results:".into(), "Found".into()],
            search_condition: "search_results".into(),
            search_settle: Duration::from_millis(50),
        }
    }
}

impl StageConfig {
    /// Defaults tuned for unit tests: no typing delay, short timeout.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            typing_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Load overrides from the environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `STAGEHAND_TIMEOUT_MS` | `timeout` |
    /// | `STAGEHAND_TYPING_DELAY_MS` | `typing_delay` |
    /// | `STAGEHAND_CAPTURE_VIEWS` | `capture_views` (`1`/`true`) |
    /// | `STAGEHAND_VIEW_CHANGE_TIMEOUT_MS` | `view_change_timeout` |
    /// | `STAGEHAND_POLL_INTERVAL_MS` | `poll_interval` |
    /// | `STAGEHAND_QUEUE_CAPACITY` | `queue_capacity` |
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("STAGEHAND_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("STAGEHAND_TYPING_DELAY_MS") {
            config.typing_delay = Duration::from_millis(ms);
        }
        if let Ok(val) = std::env::var("STAGEHAND_CAPTURE_VIEWS") {
            config.capture_views = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Some(ms) = env_u64("STAGEHAND_VIEW_CHANGE_TIMEOUT_MS") {
            config.view_change_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("STAGEHAND_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(val) = std::env::var("STAGEHAND_QUEUE_CAPACITY")
            && let Ok(capacity) = val.parse::<usize>()
        {
            config.queue_capacity = capacity;
        }

        config.validated()
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        Ok(config.validated())
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        Ok(config.validated())
    }

    /// Clamp values to workable ranges.
    ///
    /// - `timeout` at least 1ms
    /// - `poll_interval` within 1ms..=1s
    /// - `view_change_timeout` no longer than `timeout`
    /// - `queue_capacity` at least 1
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.timeout = self.timeout.max(Duration::from_millis(1));
        self.poll_interval = self.poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self.view_change_timeout = self.view_change_timeout.min(self.timeout);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_typing_delay(mut self, delay: Duration) -> Self {
        self.typing_delay = delay;
        self
    }

    #[must_use]
    pub fn with_capture_views(mut self, enabled: bool) -> Self {
        self.capture_views = enabled;
        self
    }

    #[must_use]
    pub fn with_view_change_timeout(mut self, timeout: Duration) -> Self {
        self.view_change_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_search_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
