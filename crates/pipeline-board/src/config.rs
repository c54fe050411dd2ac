//! Board configuration

use crate::error::BoardError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline board configuration
///
/// A stage update that misses `persist_timeout_ms` is rolled back like any
/// other failure, but the remote write may still land afterwards. The board
/// then shows the old stage while the store holds the new one until the next
/// reload, and [`BoardError::requires_reload`] does not flag it. Disable the
/// deadline with [`BoardConfig::without_persist_timeout`] when the service
/// enforces its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Deadline for a single stage update, in milliseconds. `None` waits
    /// for the service indefinitely. Defaults to 30 seconds.
    pub persist_timeout_ms: Option<u64>,
    /// Prospects returned by the recent-activity summary
    pub recent_limit: usize,
}

impl BoardConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With persistence deadline
    #[inline]
    #[must_use]
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Without persistence deadline
    #[inline]
    #[must_use]
    pub fn without_persist_timeout(mut self) -> Self {
        self.persist_timeout_ms = None;
        self
    }

    /// With recent-activity limit
    #[inline]
    #[must_use]
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// Persistence deadline as a duration
    #[inline]
    #[must_use]
    pub fn persist_timeout(&self) -> Option<Duration> {
        self.persist_timeout_ms.map(Duration::from_millis)
    }

    /// Parse configuration from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    /// - `BoardError::Config` if the text is not valid TOML for this shape
    pub fn from_toml_str(text: &str) -> Result<Self, BoardError> {
        let config: Self = toml::from_str(text).map_err(|e| BoardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check configuration values
    ///
    /// # Errors
    /// - `BoardError::Config` for a zero persistence deadline
    pub fn validate(&self) -> Result<(), BoardError> {
        if self.persist_timeout_ms == Some(0) {
            return Err(BoardError::Config(
                "persist_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            persist_timeout_ms: Some(30_000),
            recent_limit: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BoardConfig::new();
        assert_eq!(config.persist_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.recent_limit, 5);
    }

    #[test]
    fn builder() {
        let config = BoardConfig::new()
            .with_persist_timeout(Duration::from_millis(250))
            .with_recent_limit(10);
        assert_eq!(config.persist_timeout_ms, Some(250));
        assert_eq!(config.recent_limit, 10);
        assert_eq!(config.without_persist_timeout().persist_timeout(), None);
    }

    #[test]
    fn from_toml_partial() {
        let config = BoardConfig::from_toml_str("recent_limit = 3\n").unwrap();
        assert_eq!(config.recent_limit, 3);
        assert_eq!(config.persist_timeout_ms, Some(30_000));
    }

    #[test]
    fn from_toml_rejects_zero_timeout() {
        let err = BoardConfig::from_toml_str("persist_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, BoardError::Config(_)));
    }

    #[test]
    fn from_toml_rejects_bad_types() {
        assert!(BoardConfig::from_toml_str("recent_limit = \"many\"\n").is_err());
    }
}
