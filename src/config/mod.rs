//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on malformed values. Every field has
//! a default, so an empty environment yields a usable config.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::schedule::YieldPolicy;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// When a drain hands control back to the host.
    pub yield_policy: YieldPolicy,
    /// Events kept per queue. 0 disables the journal.
    pub journal_capacity: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            yield_policy: YieldPolicy::default(),
            journal_capacity: 0,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            yield_policy: match optional_var("WORKQ_YIELD") {
                Some(s) => s.parse()?,
                None => defaults.yield_policy,
            },
            journal_capacity: match optional_var("WORKQ_JOURNAL_CAPACITY") {
                Some(s) => s.parse().map_err(|e| {
                    Error::Config(format!("WORKQ_JOURNAL_CAPACITY must be a count: {e}"))
                })?,
                None => defaults.journal_capacity,
            },
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
