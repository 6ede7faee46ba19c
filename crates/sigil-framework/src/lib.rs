//! # Sigil Framework
//!
//! The dispatch machinery of Sigil: everything between a line of text and a
//! [`CommandResult`](sigil_core::CommandResult).
//!
//! ## Components
//!
//! - **Matching**: [`ModuleCache`] indexes the alias paths of registered
//!   module trees and finds every command an input can address
//! - **Parsing**: quote-aware tokenizing, the [`TypeParserRegistry`] and the
//!   [`DefaultArgumentParser`]
//! - **Pipeline**: the tower stages narrowing candidates to one command and
//!   running it
//! - **Filters**: result and exception chains that can be changed while the
//!   dispatcher runs
//! - **Dispatcher**: [`Dispatcher`] ties the above together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sigil_framework::prelude::*;
//!
//! let math = ModuleBuilder::new("math")
//!     .alias("math")
//!     .command(
//!         Command::builder("add", Invoker::object(|call: CommandCall| {
//!             Ok::<_, BoxError>(call.arg::<i64>("a").copied().unwrap_or(0)
//!                 + call.arg::<i64>("b").copied().unwrap_or(0))
//!         }))
//!         .parameter(Parameter::builder::<i64>("a"))
//!         .parameter(Parameter::builder::<i64>("b")),
//!     )
//!     .build()?;
//!
//! let dispatcher = Dispatcher::builder().module(math).build();
//! let result = dispatcher.execute("math add 2 3").await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `clap`: [`command::ClapArgumentParser`] for commands described by a
//!   `clap::Parser` type

#[cfg(feature = "clap")]
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod matching;
pub mod parsing;
pub mod pipeline;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{FilterError, FilterResult, ParseError, ParseResult};
pub use filter::{
    DisposeContextFilter, ExceptionFilters, Filter, FilterChainFactory, FilterDescriptor,
    FilterKind, FilterProvider, FilterRegistry, LogResultFilter, Next, ResultFilters,
};
pub use matching::ModuleCache;
pub use parsing::{DefaultArgumentParser, TypeParser, TypeParserRegistry};
pub use pipeline::{Pipeline, PipelineBuilder};

#[cfg(feature = "clap")]
pub use command::ClapArgumentParser;

/// Prelude for common imports.
pub mod prelude {
    pub use sigil_core::prelude::*;

    #[cfg(feature = "clap")]
    pub use crate::command::ClapArgumentParser;
    pub use crate::dispatcher::{Dispatcher, DispatcherBuilder};
    pub use crate::error::{FilterError, ParseError};
    pub use crate::filter::{
        DisposeContextFilter, ExceptionFilters, Filter, FilterDescriptor, FilterKind,
        FilterProvider, FilterRegistry, LogResultFilter, Next, ResultFilters,
    };
    pub use crate::matching::ModuleCache;
    pub use crate::parsing::{DefaultArgumentParser, TypeParserRegistry};
}
