//! Error types and analysis outcomes
//!
//! Empty telemetry and degenerate inputs are not errors: they surface as
//! [`Analysis::InsufficientData`]. Store failures and configuration problems
//! are errors, and only store unavailability is worth retrying.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure talking to a telemetry or derived-data store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot move recommendation from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Invalid configuration value
#[derive(Debug, Clone, Error)]
#[error("invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl PipelineError {
    /// Whether the scheduler should retry the run
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Store(e) => e.is_transient(),
            PipelineError::Configuration(_) => false,
        }
    }
}

/// Result of an analysis that may lack the data to compute anything
///
/// Lets consumers tell "nothing to show" apart from "computed, and the
/// answer is zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis<T> {
    Computed { result: T },
    InsufficientData { reason: String },
}

impl<T> Analysis<T> {
    pub fn computed(result: T) -> Self {
        Analysis::Computed { result }
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        Analysis::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Analysis::Computed { .. })
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            Analysis::Computed { result } => Some(result),
            Analysis::InsufficientData { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<T> {
        match self {
            Analysis::Computed { result } => Some(result),
            Analysis::InsufficientData { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Analysis<U> {
        match self {
            Analysis::Computed { result } => Analysis::Computed { result: f(result) },
            Analysis::InsufficientData { reason } => Analysis::InsufficientData { reason },
        }
    }
}
