//! Error types for the Sigil core.
//!
//! Two families live here:
//!
//! - [`DispatchError`]: usage and configuration errors. These are returned as
//!   `Err` from the dispatcher and are never encoded as results.
//! - [`HandlerFault`]: faults raised by command handlers, module hooks or
//!   filters. The pipeline converts them centrally into
//!   [`CommandResult::Exception`](crate::CommandResult::Exception).

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error type used across service boundaries.
///
/// Identical to `tower::BoxError`, so errors flow through tower services
/// without conversion.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Usage errors raised by the dispatch pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The raw input was empty or whitespace only.
    #[error("raw input must not be blank")]
    BlankInput,

    /// A pipeline stage ran without the state an earlier stage should have
    /// provided.
    #[error("stage '{stage}' requires {missing}, which no earlier stage provided")]
    MissingState {
        /// The stage that detected the problem.
        stage: &'static str,
        /// Description of the missing state.
        missing: &'static str,
    },

    /// A module, command or parameter definition is invalid.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// A service was required but neither registered nor activatable.
    #[error("service '{0}' is not registered")]
    ServiceNotFound(&'static str),

    /// No filter factory serves the requested filter kind.
    #[error("no filter factory serves the '{0}' filter kind")]
    FilterKindNotServed(&'static str),

    /// The factory serving a filter kind has an incompatible context type.
    #[error("filter factory for '{kind}' does not accept '{expected}' as its context")]
    FilterShapeMismatch {
        /// The requested filter kind.
        kind: &'static str,
        /// The context type the kind declares.
        expected: &'static str,
    },

    /// A fault escaped the pipeline after a result had already been set.
    #[error("a fault escaped after the result was already set: {0}")]
    FaultAfterCompletion(#[source] HandlerFault),

    /// The exception filter chain itself failed.
    #[error("exception filter chain failed: {0}")]
    ExceptionFilterFailed(#[source] HandlerFault),

    /// Any other fault that escaped the pipeline.
    #[error("pipeline fault: {0}")]
    Pipeline(#[source] HandlerFault),
}

impl DispatchError {
    /// Creates an invalid-definition error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// A fault raised while running a command, module hook or filter.
///
/// Faults are cheap to clone so that they can be stored both in the
/// exception slot of the request context and in the exception result.
#[derive(Debug, Clone, Error)]
pub enum HandlerFault {
    /// The code returned an error.
    #[error("{0}")]
    Error(Arc<dyn std::error::Error + Send + Sync>),

    /// The code panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

impl HandlerFault {
    /// Converts a panic payload into a fault.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panic(message)
    }

    /// Returns the underlying error if it is of type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Error(e) => e.downcast_ref::<E>(),
            Self::Panic(_) => None,
        }
    }

    /// Returns `true` if the fault came from a panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }
}

impl From<BoxError> for HandlerFault {
    fn from(err: BoxError) -> Self {
        Self::Error(Arc::from(err))
    }
}
