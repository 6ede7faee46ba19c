//! # Sigil Core
//!
//! The core data model of the Sigil command dispatch framework.
//!
//! This crate holds everything the dispatch pipeline reasons about but none of
//! the pipeline itself:
//!
//! ## Foundation Layer
//!
//! - **Results**: the closed outcome model ([`CommandResult`])
//! - **Request context**: per-invocation mutable state ([`RequestContext`])
//! - **Services**: the resolve-or-activate contract ([`ServiceProvider`]) and a
//!   small container implementation ([`ServiceCollection`])
//! - **Disposal**: end-of-request resource release ([`DisposalRegistry`])
//! - **Configuration**: matching and execution defaults ([`DispatchConfig`])
//!
//! ## Model Layer
//!
//! - **Registry data**: [`Module`], [`Command`] and [`Parameter`] trees, built
//!   through [`ModuleBuilder`] / [`CommandBuilder`] / [`ParameterBuilder`]
//! - **Invocation strategies**: [`Invoker`] adapts handler shapes into one
//!   asynchronous call
//! - **Contracts**: [`Precondition`], [`ParameterPrecondition`],
//!   [`ArgumentParser`] and [`CommandModule`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use sigil_core::prelude::*;
//!
//! let math = ModuleBuilder::new("math")
//!     .alias("math")
//!     .command(
//!         Command::builder("add", Invoker::object(|call: CommandCall| {
//!             let a = *call.arg::<i64>("a").unwrap_or(&0);
//!             let b = *call.arg::<i64>("b").unwrap_or(&0);
//!             Ok::<_, BoxError>(a + b)
//!         }))
//!         .parameter(Parameter::builder::<i64>("a"))
//!         .parameter(Parameter::builder::<i64>("b")),
//!     )
//!     .build()?;
//! ```

pub mod foundation;
pub mod model;

pub use foundation::{
    AnyValue, AsyncDisposable, AsyncHandle, BoxError, CommandResult, DispatchConfig,
    DispatchError, DispatchResult, Disposable, DisposalRegistry, HandlerFault, MatchFailure,
    MultiMatchHandling, RequestContext, ResultKind, ResultSummary, RunMode, ServiceArc,
    ServiceCollection, ServiceProvider, StringComparison, on_dispose,
};
pub use model::{
    ArgumentParser, Arguments, Command, CommandBuilder, CommandCall, CommandMatch, CommandModule,
    FnParameterPrecondition, FnPrecondition, Invoker, InvokerShape, Module, ModuleActivator,
    ModuleBuilder, ModuleInstance, ParamPreconditionFailure, Parameter, ParameterBuilder,
    ParameterPrecondition, ParseOutcome, ParserOverride, Precondition, PreconditionFailure,
    PreconditionResult, parameter_precondition, precondition,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::model::*;
}
