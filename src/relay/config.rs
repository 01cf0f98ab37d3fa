use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Mailbox;
use crate::store::DEFAULT_BATCH_SIZE;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to parse config TOML")]
    Parse(#[from] toml::de::Error),
}

/// Polling settings for one loop.
///
/// Deserializes with defaults for missing keys; the poll interval is given
/// in milliseconds:
///
/// ```toml
/// batch_size = 100
/// poll_interval_ms = 500
/// concurrency = 1
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Maximum records selected per cycle.
    pub batch_size: usize,
    /// Pause between cycles.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Attempts in flight at once within a batch. `1` is strictly sequential.
    pub concurrency: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            concurrency: 1,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

impl RelayConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Apply `{PREFIX}_BATCH_SIZE`, `{PREFIX}_POLL_INTERVAL_MS` and
    /// `{PREFIX}_CONCURRENCY`. Unparseable values are logged and ignored.
    ///
    /// Takes a resolver so tests do not have to touch the process environment.
    pub fn apply_overrides(&mut self, prefix: &str, env: &impl Fn(&str) -> Option<String>) {
        if let Some(batch_size) = parse_override(env, &format!("{prefix}_BATCH_SIZE")) {
            self.batch_size = batch_size;
        }
        if let Some(millis) = parse_override(env, &format!("{prefix}_POLL_INTERVAL_MS")) {
            self.poll_interval = Duration::from_millis(millis);
        }
        if let Some(concurrency) = parse_override(env, &format!("{prefix}_CONCURRENCY")) {
            self.concurrency = concurrency;
        }
    }
}

fn parse_override<T: FromStr>(env: &impl Fn(&str) -> Option<String>, var: &str) -> Option<T> {
    let value = env(var)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var, value = %value, "ignoring invalid env override");
            None
        }
    }
}

/// Settings for both loops, as loaded by the host.
///
/// ```toml
/// [outbox]
/// batch_size = 50
///
/// [inbox]
/// poll_interval_ms = 250
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub outbox: RelayConfig,
    pub inbox: RelayConfig,
}

impl MessagingConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MessagingConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn relay(&self, mailbox: Mailbox) -> &RelayConfig {
        match mailbox {
            Mailbox::Outbox => &self.outbox,
            Mailbox::Inbox => &self.inbox,
        }
    }

    /// Environment overrides take precedence over file values and defaults.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        self.outbox
            .apply_overrides(Mailbox::Outbox.env_prefix(), &env);
        self.inbox.apply_overrides(Mailbox::Inbox.env_prefix(), &env);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.outbox.validate()?;
        self.inbox.validate()
    }
}
