//! # Orchestration
//!
//! Top-level coordination of planning, workflow construction, execution and
//! persistence, plus the error classification and backoff policy the engine
//! uses for provider failures.

pub mod backoff_calculator;
pub mod error_classifier;
pub mod orchestrator;

pub use backoff_calculator::BackoffCalculator;
pub use error_classifier::{
    ErrorCategory, ErrorClassification, ErrorClassifier, ErrorContext, StandardErrorClassifier,
};
pub use orchestrator::Orchestrator;
