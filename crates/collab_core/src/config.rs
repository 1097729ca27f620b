//! Runtime configuration for the collaboration core.
//!
//! # Responsibility
//! - Define defaults for every tunable used by the core components.
//! - Load JSON configuration and validate it before use.
//!
//! # Invariants
//! - A `CollabConfig` handed to constructors has passed `validate()`.
//! - Nothing in core reads configuration from process-wide state.

use crate::mention::parser::{is_valid_trigger, DEFAULT_TRIGGER};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_UNDO_DEPTH: usize = 100;
pub const DEFAULT_EXCERPT_CHARS: usize = 100;
pub const DEFAULT_MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidTrigger(char),
    /// A numeric setting that must be positive was zero.
    ZeroValue(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid configuration json: {err}"),
            Self::InvalidTrigger(ch) => write!(f, "`{ch}` cannot be used as mention trigger"),
            Self::ZeroValue(field) => write!(f, "`{field}` must be greater than zero"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidTrigger(_) | Self::ZeroValue(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// File logging settings consumed by `logging::init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute log directory.
    pub directory: String,
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            directory: String::new(),
            max_file_bytes: DEFAULT_MAX_LOG_FILE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    pub mention_trigger: char,
    pub poll_interval_secs: u64,
    pub undo_depth: usize,
    /// Max chars of comment text copied into notification payloads.
    pub excerpt_chars: usize,
    pub admin_principals: Vec<String>,
    pub read_only_principals: Vec<String>,
    pub logging: LoggingConfig,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            mention_trigger: DEFAULT_TRIGGER,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            undo_depth: DEFAULT_UNDO_DEPTH,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            admin_principals: Vec::new(),
            read_only_principals: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CollabConfig {
    /// Parses JSON; missing fields take their defaults.
    ///
    /// # Errors
    /// - `ConfigError::Parse` for malformed JSON or mistyped fields.
    /// - Any error reported by `validate()`.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_trigger(self.mention_trigger) {
            return Err(ConfigError::InvalidTrigger(self.mention_trigger));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroValue("poll_interval_secs"));
        }
        if self.undo_depth == 0 {
            return Err(ConfigError::ZeroValue("undo_depth"));
        }
        if self.excerpt_chars == 0 {
            return Err(ConfigError::ZeroValue("excerpt_chars"));
        }
        if self.logging.max_file_bytes == 0 {
            return Err(ConfigError::ZeroValue("logging.max_file_bytes"));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::ZeroValue("logging.max_files"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::{CollabConfig, ConfigError, DEFAULT_POLL_INTERVAL_SECS};
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let config = CollabConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.mention_trigger, '@');
        assert_eq!(config.poll_interval(), Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config = CollabConfig::from_json_str(
            r#"{"poll_interval_secs": 5, "admin_principals": ["Ops@Example.com"], "logging": {"level": "warn"}}"#,
        )
        .expect("partial config should load");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.undo_depth, 100);
        assert_eq!(config.admin_principals, vec!["Ops@Example.com".to_string()]);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero = CollabConfig::from_json_str(r#"{"poll_interval_secs": 0}"#)
            .expect_err("zero interval must fail");
        assert!(matches!(zero, ConfigError::ZeroValue("poll_interval_secs")));

        let trigger = CollabConfig::from_json_str(r#"{"mention_trigger": "a"}"#)
            .expect_err("name char trigger must fail");
        assert!(matches!(trigger, ConfigError::InvalidTrigger('a')));

        let malformed = CollabConfig::from_json_str("{").expect_err("malformed json must fail");
        assert!(matches!(malformed, ConfigError::Parse(_)));
    }
}
