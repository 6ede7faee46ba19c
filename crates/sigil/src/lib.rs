//! # Sigil
//!
//! A layered, type-safe framework that resolves lines of text to commands and
//! runs them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────────────────────────────────────────┐
//! │   Runtime   │────▶│ Dispatcher                                                   │
//! │ (line host) │     │  match ─▶ count ─▶ parse ─▶ preconditions ─▶ execute ─▶ filters │
//! └─────────────┘     └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Core** (`sigil-core`): modules, commands, parameters, results and the
//!   request context
//! - **Framework** (`sigil-framework`): the alias index, argument parsing, the
//!   tower pipeline and the filter chains
//! - **Runtime** (`sigil-runtime`): configuration, logging and the host loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sigil::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let math = ModuleBuilder::new("math")
//!         .alias("math")
//!         .command(
//!             Command::builder("add", Invoker::object(|call: CommandCall| {
//!                 let a = call.arg::<i64>("a").copied().unwrap_or_default();
//!                 let b = call.arg::<i64>("b").copied().unwrap_or_default();
//!                 Ok::<_, BoxError>(a + b)
//!             }))
//!             .parameter(Parameter::builder::<i64>("a"))
//!             .parameter(Parameter::builder::<i64>("b")),
//!         )
//!         .build()?;
//!
//!     let runtime = SigilRuntime::builder().module(math).build()?;
//!     let result = runtime.execute("math add 2 3").await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output
//! - `clap`: commands whose arguments are a `clap::Parser` type

pub use sigil_core as core;
pub use sigil_framework as framework;
pub use sigil_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sigil::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use sigil_runtime::{ConfigLoader, LoggingBuilder, SigilConfig, SigilRuntime};

    // Dispatcher and its extension points
    pub use sigil_framework::prelude::*;
}
