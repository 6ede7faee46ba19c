//! Configuration for the Sigil runtime.
//!
//! A [`SigilConfig`] holds the dispatcher defaults and the logging setup. It
//! is loaded in layers by [`ConfigLoader`] and checked by
//! [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SigilConfig, SpanEventConfig,
};
pub use validation::validate_config;
