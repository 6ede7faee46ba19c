//! Error types for the Sigil framework.

use thiserror::Error;

/// Errors raised while converting a token into a typed value.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// No parser is registered for the parameter's declared type.
    #[error("no parser is registered for type '{0}'")]
    NoParser(&'static str),

    /// The token could not be converted.
    #[error("'{token}' is not a valid {expected}: {message}")]
    Invalid {
        /// The offending token.
        token: String,
        /// The expected type name.
        expected: &'static str,
        /// The converter's message.
        message: String,
    },

    /// A quote was opened but never closed.
    #[error("unterminated quote in input")]
    UnterminatedQuote,

    /// Custom parse error.
    #[error("{0}")]
    Custom(String),
}

impl ParseError {
    /// Creates a custom parse error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised by filter registration.
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    /// A descriptor was registered without serving any filter kind.
    #[error("filter '{0}' does not serve any filter kind")]
    NoKinds(&'static str),

    /// No registered filter has the given id.
    #[error("no filter with id {0} is registered")]
    UnknownFilter(u64),

    /// A service-kind filter could not be resolved.
    #[error("filter service '{0}' is not registered")]
    ServiceMissing(&'static str),
}

/// Result type for filter registration.
pub type FilterResult<T> = Result<T, FilterError>;
