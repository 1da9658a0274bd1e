//! Dependency-aware execution engine for generated API test chains.
//!
//! Two independent halves:
//!
//! - [`analyzer`] infers ordering dependencies between the operations of
//!   an OpenAPI-like description.
//! - [`executor`] runs already-generated test suites against a live
//!   target, passing extracted values between steps through a scoped
//!   [`VariableStore`] and wrapping every request in retry and timeout
//!   policies.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod http;
pub mod loader;
pub mod model;
pub mod policy;
pub mod variables;

pub use analyzer::{
    ApiDescription, Dependency, DependencyAnalyzer, DependencyReport, DependencyType, Endpoint,
    NodeRef, Strength,
};
pub use config::{AnalyzerConfig, ConfidenceWeights, EngineConfig, RetryConfig};
pub use error::{ChainError, ErrorKind, ExecutionError, VariableError};
pub use executor::{CaseExecutor, StepExecutor, SuiteExecutor};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use loader::SuiteLoader;
pub use model::*;
pub use policy::{BackoffStrategy, RetryPolicy, TimeoutPolicy};
pub use variables::{Scope, SessionSink, Variable, VariableStore, VariableType};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
