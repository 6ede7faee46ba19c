//! The outcome model.
//!
//! Every dispatch ends in exactly one [`CommandResult`]. Domain failures
//! (nothing matched, wrong arity, failed checks) are result variants rather
//! than errors; only usage errors surface as
//! [`DispatchError`](crate::DispatchError).

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;

use super::error::HandlerFault;
use super::value::AnyValue;
use crate::model::{
    Command, CommandMatch, ParamPreconditionFailure, Parameter, PreconditionFailure,
};

/// The outcome of dispatching one input.
#[derive(Debug, Clone)]
pub enum CommandResult {
    /// The command ran. Carries the handler's payload, if any.
    Success(Option<AnyValue>),

    /// No registered alias path matched the input.
    CommandNotFound {
        /// The input that was searched.
        input: String,
    },

    /// The only matching command (or its module) is disabled.
    CommandDisabled {
        /// The disabled command.
        command: Arc<Command>,
    },

    /// The remaining input does not fit the command's parameter list.
    BadArgCount {
        /// The rejected command.
        command: Arc<Command>,
    },

    /// A single command's arguments could not be converted.
    ParseFailed {
        /// The command being parsed.
        command: Arc<Command>,
        /// The parameter that failed, when the parser can tell.
        parameter: Option<Arc<Parameter>>,
        /// Why parsing failed.
        reason: String,
    },

    /// Several commands matched and none of their modules allows the
    /// pipeline to pick one automatically.
    MultiMatch {
        /// The ambiguous candidates.
        matches: Vec<CommandMatch>,
    },

    /// Several commands matched and every one of them failed.
    MatchesFailed {
        /// One entry per failed candidate, in encounter order.
        failures: Vec<MatchFailure>,
    },

    /// One or more command or module preconditions rejected the request.
    PreconditionsFailed {
        /// The checked command.
        command: Arc<Command>,
        /// The failing preconditions in declaration order.
        failures: Vec<PreconditionFailure>,
    },

    /// One or more preconditions of a parameter rejected its value.
    ParamPreconditionsFailed {
        /// The checked parameter.
        parameter: Arc<Parameter>,
        /// The parsed value that was rejected.
        value: AnyValue,
        /// The failing preconditions in declaration order.
        failures: Vec<ParamPreconditionFailure>,
    },

    /// A handler, hook or filter faulted.
    Exception {
        /// Human-readable description of the fault.
        reason: String,
        /// The captured fault.
        fault: HandlerFault,
    },

    /// The command runs concurrently; the handle yields its terminal result.
    Async(AsyncHandle),
}

/// A candidate that failed during multi-match resolution.
#[derive(Debug, Clone)]
pub struct MatchFailure {
    /// The candidate command.
    pub command: Arc<Command>,
    /// Why it was rejected.
    pub result: CommandResult,
}

impl CommandResult {
    /// A success without payload.
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// A success carrying `value`.
    pub fn success_with<T>(value: T) -> Self
    where
        T: std::any::Any + Send + Sync + fmt::Debug,
    {
        Self::Success(Some(AnyValue::new(value)))
    }

    /// Wraps a fault as an exception result.
    pub fn exception(fault: HandlerFault) -> Self {
        Self::Exception {
            reason: fault.to_string(),
            fault,
        }
    }

    /// Returns `true` only for [`CommandResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success payload, if any.
    pub fn value(&self) -> Option<&AnyValue> {
        match self {
            Self::Success(value) => value.as_ref(),
            _ => None,
        }
    }

    /// The command this result is about, when there is exactly one.
    pub fn command(&self) -> Option<&Arc<Command>> {
        match self {
            Self::CommandDisabled { command }
            | Self::BadArgCount { command }
            | Self::ParseFailed { command, .. }
            | Self::PreconditionsFailed { command, .. } => Some(command),
            _ => None,
        }
    }

    /// The discriminant of this result.
    pub fn kind(&self) -> ResultKind {
        match self {
            Self::Success(_) => ResultKind::Success,
            Self::CommandNotFound { .. } => ResultKind::CommandNotFound,
            Self::CommandDisabled { .. } => ResultKind::CommandDisabled,
            Self::BadArgCount { .. } => ResultKind::BadArgCount,
            Self::ParseFailed { .. } => ResultKind::ParseFailed,
            Self::MultiMatch { .. } => ResultKind::MultiMatch,
            Self::MatchesFailed { .. } => ResultKind::MatchesFailed,
            Self::PreconditionsFailed { .. } => ResultKind::PreconditionsFailed,
            Self::ParamPreconditionsFailed { .. } => ResultKind::ParamPreconditionsFailed,
            Self::Exception { .. } => ResultKind::Exception,
            Self::Async(_) => ResultKind::Async,
        }
    }

    /// Human-readable reason. `None` only for [`CommandResult::Success`].
    pub fn reason(&self) -> Option<String> {
        let reason = match self {
            Self::Success(_) => return None,
            Self::CommandNotFound { input } => format!("no command matches '{input}'"),
            Self::CommandDisabled { command } => {
                format!("command '{}' is disabled", command.name())
            }
            Self::BadArgCount { command } => format!(
                "command '{}' expects {} argument(s)",
                command.name(),
                command.arity_description()
            ),
            Self::ParseFailed {
                command,
                parameter,
                reason,
            } => match parameter {
                Some(p) => format!(
                    "failed to parse parameter '{}' of command '{}': {reason}",
                    p.name(),
                    command.name()
                ),
                None => format!("failed to parse command '{}': {reason}", command.name()),
            },
            Self::MultiMatch { matches } => {
                let aliases: Vec<&str> = matches.iter().map(|m| m.alias()).collect();
                format!(
                    "input is ambiguous between {} commands: {}",
                    matches.len(),
                    aliases.join(", ")
                )
            }
            Self::MatchesFailed { failures } => {
                let parts: Vec<String> = failures
                    .iter()
                    .map(|f| {
                        format!(
                            "{}: {}",
                            f.command.name(),
                            f.result.reason().unwrap_or_default()
                        )
                    })
                    .collect();
                format!("every matching command failed ({})", parts.join("; "))
            }
            Self::PreconditionsFailed { command, failures } => {
                let reasons: Vec<&str> = failures.iter().map(|f| f.reason.as_str()).collect();
                format!(
                    "command '{}' was rejected: {}",
                    command.name(),
                    reasons.join("; ")
                )
            }
            Self::ParamPreconditionsFailed {
                parameter,
                failures,
                ..
            } => {
                let reasons: Vec<&str> = failures.iter().map(|f| f.reason.as_str()).collect();
                let command = parameter
                    .command()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default();
                format!(
                    "parameter '{}' of command '{command}' was rejected: {}",
                    parameter.name(),
                    reasons.join("; ")
                )
            }
            Self::Exception { reason, .. } => reason.clone(),
            Self::Async(_) => "command is still running".to_string(),
        };
        Some(reason)
    }

    /// A serializable digest of this result.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            kind: self.kind(),
            success: self.is_success(),
            reason: self.reason(),
            command: self.command().map(|c| c.name().to_string()),
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value(), self.reason()) {
            (Some(value), _) => write!(f, "{value:?}"),
            (None, Some(reason)) => f.write_str(&reason),
            (None, None) => f.write_str("ok"),
        }
    }
}

/// Discriminant of [`CommandResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    CommandNotFound,
    CommandDisabled,
    BadArgCount,
    ParseFailed,
    MultiMatch,
    MatchesFailed,
    PreconditionsFailed,
    ParamPreconditionsFailed,
    Exception,
    Async,
}

/// Structured digest of a [`CommandResult`] for logs and machine output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub kind: ResultKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Handle to a command running under the concurrent run mode.
///
/// The handle is cheap to clone; every clone observes the same terminal
/// result. Dropping all handles does not cancel the work.
#[derive(Clone)]
pub struct AsyncHandle {
    inner: Shared<BoxFuture<'static, CommandResult>>,
}

impl AsyncHandle {
    /// Wraps a future yielding the terminal result.
    pub fn new(fut: BoxFuture<'static, CommandResult>) -> Self {
        Self { inner: fut.shared() }
    }

    /// Waits for the terminal result.
    pub async fn wait(&self) -> CommandResult {
        self.inner.clone().await
    }

    /// Returns the terminal result if it is already available.
    pub fn try_result(&self) -> Option<CommandResult> {
        self.inner.peek().cloned()
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("completed", &self.inner.peek().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Command, Invoker, ModuleBuilder, Parameter};
    use std::sync::Arc;

    fn add_command() -> Arc<Command> {
        let module = ModuleBuilder::new("math")
            .alias("math")
            .command(
                Command::builder("add", Invoker::void(|_| Ok::<_, crate::BoxError>(())))
                    .parameter(Parameter::builder::<i64>("a"))
                    .parameter(Parameter::builder::<i64>("b")),
            )
            .build()
            .unwrap();
        Arc::clone(&module.commands()[0])
    }

    #[test]
    fn test_success_has_no_reason() {
        let result = CommandResult::success_with(5_i64);
        assert!(result.is_success());
        assert!(result.reason().is_none());
        assert_eq!(result.value().unwrap().downcast_ref::<i64>(), Some(&5));
        assert_eq!(result.to_string(), "5");
    }

    #[test]
    fn test_failures_carry_reasons() {
        let command = add_command();
        let results = [
            CommandResult::CommandNotFound {
                input: "calc add".into(),
            },
            CommandResult::CommandDisabled {
                command: Arc::clone(&command),
            },
            CommandResult::BadArgCount {
                command: Arc::clone(&command),
            },
            CommandResult::MatchesFailed { failures: vec![] },
        ];
        for result in &results {
            assert!(!result.is_success());
            assert!(result.reason().is_some(), "{:?}", result.kind());
        }
    }

    #[test]
    fn test_summary_serializes() {
        let result = CommandResult::BadArgCount {
            command: add_command(),
        };
        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["kind"], "bad_arg_count");
        assert_eq!(json["success"], false);
        assert_eq!(json["command"], "add");
        assert_eq!(json["reason"], "command 'add' expects 2 argument(s)");
    }

    #[tokio::test]
    async fn test_async_handle_shares_result() {
        let handle = AsyncHandle::new(async { CommandResult::success_with("done") }.boxed());
        let copy = handle.clone();
        assert!(handle.try_result().is_none());
        assert!(handle.wait().await.is_success());
        assert!(copy.try_result().unwrap().is_success());
    }
}
