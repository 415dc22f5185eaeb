//! Closing processor configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when computing a balance or posting an entry fails part-way
/// through a voucher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it. Entries already posted for the
    /// voucher stay posted.
    #[default]
    Propagate,
    /// Compute every balance and build every entry before posting anything; if
    /// a post fails, cancel the entries posted so far in this run.
    AllOrNothing,
    /// Keep going past failures and report a status per account.
    BestEffort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "propagate" => Ok(Self::Propagate),
            "all_or_nothing" => Ok(Self::AllOrNothing),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Closing voucher processing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingConfig {
    /// Vouchers with more accounts than this are processed in the background.
    pub sync_threshold: usize,
    /// Queue used for background processing.
    pub queue_name: String,
    /// Timeout for one background run.
    pub queue_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for ClosingConfig {
    fn default() -> Self {
        Self {
            sync_threshold: 40,
            queue_name: "long".to_string(),
            queue_timeout: Duration::from_secs(600),
            failure_policy: FailurePolicy::Propagate,
        }
    }
}

impl ClosingConfig {
    pub const ENV_SYNC_THRESHOLD: &'static str = "ACCTKIT_CLOSING_SYNC_THRESHOLD";
    pub const ENV_QUEUE: &'static str = "ACCTKIT_CLOSING_QUEUE";
    pub const ENV_TIMEOUT_SECS: &'static str = "ACCTKIT_CLOSING_TIMEOUT_SECS";
    pub const ENV_FAILURE_POLICY: &'static str = "ACCTKIT_CLOSING_FAILURE_POLICY";

    pub fn with_sync_threshold(mut self, threshold: usize) -> Self {
        self.sync_threshold = threshold;
        self
    }

    pub fn with_queue(mut self, name: impl Into<String>, timeout: Duration) -> Self {
        self.queue_name = name.into();
        self.queue_timeout = timeout;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Whether a voucher with `accounts` rows must go to the background queue.
    pub fn should_defer(&self, accounts: usize) -> bool {
        accounts > self.sync_threshold
    }

    /// Defaults overridden by `ACCTKIT_CLOSING_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::ENV_SYNC_THRESHOLD) {
            match raw.trim().parse() {
                Ok(v) => config.sync_threshold = v,
                Err(_) => tracing::warn!(key = Self::ENV_SYNC_THRESHOLD, value = %raw, "ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_QUEUE) {
            if raw.trim().is_empty() {
                tracing::warn!(key = Self::ENV_QUEUE, "ignoring empty queue name");
            } else {
                config.queue_name = raw.trim().to_string();
            }
        }

        if let Some(raw) = lookup(Self::ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.queue_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(key = Self::ENV_TIMEOUT_SECS, value = %raw, "ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_FAILURE_POLICY) {
            match raw.parse() {
                Ok(policy) => config.failure_policy = policy,
                Err(e) => tracing::warn!(key = Self::ENV_FAILURE_POLICY, error = %e, "ignoring invalid value"),
            }
        }

        config
    }
}
