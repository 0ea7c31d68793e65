//! Runtime configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of a proxy's event buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8;

/// Settings shared by a [`Proxy`](crate::Proxy) and the
/// [`Runtime`](crate::Runtime) that drains it.
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// use flipflop::Config;
///
/// let config: Config = serde_json::from_str(r#"{ "buffer_capacity": 32 }"#).unwrap();
/// assert_eq!(config.buffer_capacity, 32);
/// assert_eq!(config.label, "transducer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name recorded on the run's tracing span.
    pub label: String,

    /// Number of events the proxy buffers before `send` overflows.
    pub buffer_capacity: usize,

    /// How long a cancelled operation may keep running to report its own
    /// cancellation. Zero grants exactly one final poll.
    pub cancellation_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label: "transducer".to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            cancellation_grace_ms: 0,
        }
    }
}

impl Config {
    /// Create a default configuration with the given label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_cancellation_grace(mut self, grace: Duration) -> Self {
        self.cancellation_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn cancellation_grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }

    /// Check the configuration before it is used to build a proxy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.label.trim().is_empty() {
            return Err(ConfigError::EmptyLabel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.cancellation_grace(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "label": "search", "cancellation_grace_ms": 250 }"#)
                .unwrap();
        assert_eq!(config.label, "search");
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.cancellation_grace(), Duration::from_millis(250));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = Config::default().with_buffer_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn blank_label_is_rejected() {
        let config = Config::labeled("   ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyLabel));
    }

    #[test]
    fn builder_methods_compose() {
        let config = Config::labeled("timer")
            .with_buffer_capacity(2)
            .with_cancellation_grace(Duration::from_secs(1));
        assert_eq!(config.buffer_capacity, 2);
        assert_eq!(config.cancellation_grace_ms, 1_000);
    }
}
