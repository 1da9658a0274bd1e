//! Error kinds raised by the variable store, the execution policies
//! and the executors.
//!
//! Retry and timeout policies inspect [`ErrorKind`] rather than
//! matching on error messages.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from variable lookup, typing and template substitution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    /// No scope holds the name and no default was supplied.
    #[error("variable '{name}' not found")]
    NotFound { name: String },

    /// The value does not match the variable's declared type.
    #[error("variable '{name}' expects type {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Template substitution exhausted its recursion budget.
    #[error(
        "circular reference while resolving '${{{name}}}' \
         (max depth {max_depth} exceeded)"
    )]
    CircularReference { name: String, max_depth: usize },

    /// Generator arguments were out of range.
    #[error("invalid generator arguments: {0}")]
    InvalidGenerator(String),
}

/// Coarse classification of an [`ExecutionError`], used to decide
/// whether an attempt may be retried.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Timeout,
    Request,
    Response,
    Variable,
    RetriesExhausted,
}

/// Errors surfaced while issuing a step's HTTP call.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The target could not be reached (DNS, refused, reset).
    #[error("connection error: {0}")]
    Connection(String),

    /// The operation did not complete within its deadline.
    #[error("operation timed out after {}ms", .limit.as_millis())]
    Timeout { limit: Duration },

    /// The request could not be built (bad URL, bad header).
    #[error("invalid request: {0}")]
    Request(String),

    /// The response could not be read.
    #[error("failed to read response: {0}")]
    Response(String),

    /// Template resolution failed before the request was sent.
    #[error(transparent)]
    Variable(#[from] VariableError),

    /// A retryable failure persisted past the retry budget.
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<ExecutionError>,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Request(_) => ErrorKind::Request,
            Self::Response(_) => ErrorKind::Response,
            Self::Variable(_) => ErrorKind::Variable,
            Self::MaxRetriesExceeded { .. } => ErrorKind::RetriesExhausted,
        }
    }

    /// Whether the underlying cause (after unwrapping retry
    /// exhaustion) was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::MaxRetriesExceeded { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Request(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Response(err.to_string())
        } else {
            // connect, request and redirect errors are transport-level
            Self::Connection(err.to_string())
        }
    }
}

/// Contract violations in a suite definition. These are the only
/// errors a suite run returns instead of recording in its result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("test case '{case_id}' has no steps")]
    EmptyCase { case_id: String },

    #[error("test case '{case_id}' repeats step sequence {sequence}")]
    DuplicateSequence { case_id: String, sequence: i64 },

    #[error("suite '{suite_id}' repeats case id '{case_id}'")]
    DuplicateCase { suite_id: String, case_id: String },
}
