//! Foundation layer: results, request context, services, disposal and
//! configuration.

pub mod config;
pub mod context;
pub mod dispose;
pub mod error;
pub mod result;
pub mod services;
pub mod value;

pub use config::{DispatchConfig, MultiMatchHandling, RunMode, StringComparison};
pub use context::RequestContext;
pub use dispose::{AsyncDisposable, Disposable, DisposalRegistry, on_dispose};
pub use error::{BoxError, DispatchError, DispatchResult, HandlerFault};
pub use result::{AsyncHandle, CommandResult, MatchFailure, ResultKind, ResultSummary};
pub use services::{ServiceArc, ServiceCollection, ServiceProvider};
pub use value::AnyValue;
