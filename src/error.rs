//! Error types for workq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("node `{description}` failed: {source}")]
    NodeFailed {
        description: String,
        #[source]
        source: NodeError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single node's `execute` did not complete.
///
/// The queue never inspects this beyond reporting it; it travels back to
/// whoever initiated the drain.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl NodeError {
    /// Shorthand for a plain message failure.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Wrap any error type as the failure source.
    pub fn source(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(err))
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}
