//! Sigil Runtime - configuration, logging and hosting for the Sigil command
//! dispatch framework.
//!
//! This crate provides:
//! - Layered configuration loading ([`ConfigLoader`], [`SigilConfig`])
//! - Logging bootstrap over `tracing-subscriber` ([`LoggingBuilder`])
//! - A line-oriented host ([`SigilRuntime`]) feeding any `AsyncBufRead`
//!   through a [`Dispatcher`](sigil_framework::Dispatcher)
//!
//! ```ignore
//! use sigil_runtime::SigilRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SigilRuntime::builder()
//!         .module(math_module()?)
//!         .build()?;
//!
//!     runtime
//!         .run_stdin(|_, result| {
//!             if let Ok(result) = result {
//!                 println!("{result}");
//!             }
//!         })
//!         .await?;
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `toml-config` / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `clap`: clap-backed argument parsing in `sigil-framework`

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, SigilConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RunStats, RuntimeBuilder, SigilRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
