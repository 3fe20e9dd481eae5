//! Configuration loading and types for peerlease.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! crate: the shared document's identity, election timing, and the
//! retry/backoff policy for optimistic-concurrency races.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Identity of the shared coordination document.
    #[serde(default)]
    pub document: DocumentConfig,

    /// Leader election settings.
    #[serde(default)]
    pub election: ElectionConfig,

    /// Retry / backoff policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Identity of the document every peer coordinates on.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Namespace the document lives in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Document name within the namespace.
    #[serde(default = "default_document_name")]
    pub name: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            name: default_document_name(),
        }
    }
}

/// Leader election configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ElectionConfig {
    /// How long an unrenewed lease stays live, in seconds.
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,
}

impl ElectionConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: default_lease_duration_secs(),
        }
    }
}

/// Bounded retry policy for operations that recompute after a conflict.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts before giving up with `RetriesExhausted`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff in milliseconds, doubled on every further attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Upper bound for a single backoff step in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    /// Backoff before retry `attempt` (1-based): exponential doubling capped
    /// at `max_backoff_ms`, plus up to 25% random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        let jitter = if base == 0 {
            0
        } else {
            rand::random::<u64>() % (base / 4 + 1)
        };
        Duration::from_millis(base + jitter)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_namespace() -> String {
    "default".to_string()
}

fn default_document_name() -> String {
    "peerlease".to_string()
}

fn default_lease_duration_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
