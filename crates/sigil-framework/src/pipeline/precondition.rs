//! Parameter and command precondition stages.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tower::{BoxError, Layer, Service};
use tracing::debug;

use sigil_core::{
    Arguments, Command, CommandResult, DispatchError, MatchFailure, ParamPreconditionFailure,
    PreconditionFailure, RequestContext,
};

use super::state::{candidates, settle};

/// Runs the preconditions of each parameter against its parsed value.
///
/// One parameter's preconditions run concurrently. The first parameter with
/// a failing check rejects the candidate.
async fn check_parameters(ctx: &RequestContext, arguments: &Arguments) -> Option<CommandResult> {
    for (parameter, value) in arguments.iter() {
        if parameter.preconditions().is_empty() {
            continue;
        }
        let outcomes = join_all(
            parameter
                .preconditions()
                .iter()
                .map(|p| p.check(ctx, parameter, value)),
        )
        .await;
        let failures: Vec<ParamPreconditionFailure> = parameter
            .preconditions()
            .iter()
            .zip(outcomes)
            .filter_map(|(p, outcome)| {
                outcome.err().map(|reason| ParamPreconditionFailure {
                    precondition: Arc::clone(p),
                    reason,
                })
            })
            .collect();
        if !failures.is_empty() {
            return Some(CommandResult::ParamPreconditionsFailed {
                parameter: Arc::clone(parameter),
                value: value.clone(),
                failures,
            });
        }
    }
    None
}

/// Runs the command's preconditions followed by those inherited from its
/// modules, all concurrently.
async fn check_command(ctx: &RequestContext, command: &Arc<Command>) -> Option<CommandResult> {
    let preconditions = command.inherited_preconditions();
    if preconditions.is_empty() {
        return None;
    }
    let outcomes = join_all(preconditions.iter().map(|p| p.check(ctx, command))).await;
    let failures: Vec<PreconditionFailure> = preconditions
        .iter()
        .zip(outcomes)
        .filter_map(|(p, outcome)| {
            outcome.err().map(|reason| PreconditionFailure {
                precondition: Arc::clone(p),
                reason,
            })
        })
        .collect();
    (!failures.is_empty()).then(|| CommandResult::PreconditionsFailed {
        command: Arc::clone(command),
        failures,
    })
}

// ============================================================================
// ParamPreconditionLayer
// ============================================================================

/// Narrows candidates by their parameter preconditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamPreconditionLayer;

impl<S> Layer<S> for ParamPreconditionLayer {
    type Service = ParamPreconditionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ParamPreconditionService { inner }
    }
}

pub struct ParamPreconditionService<S> {
    inner: S,
}

impl<S: Clone> Clone for ParamPreconditionService<S> {
    fn clone(&self) -> Self {
        ParamPreconditionService {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for ParamPreconditionService<S>
where
    S: Service<Arc<RequestContext>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<RequestContext>) -> Self::Future {
        let mut inner = self.inner.clone();

        async move {
            if ctx.has_result() {
                return inner.call(ctx).await;
            }

            let all = candidates(&ctx, "parameter preconditions")?;
            let total = all.len();
            let mut survivors = Vec::new();
            let mut failures = Vec::new();
            for candidate in all {
                let arguments =
                    candidate
                        .arguments
                        .as_ref()
                        .ok_or(DispatchError::MissingState {
                            stage: "parameter preconditions",
                            missing: "parsed arguments",
                        })?;
                match check_parameters(&ctx, arguments).await {
                    None => survivors.push(candidate),
                    Some(result) => {
                        debug!(
                            command = candidate.matched.command().name(),
                            "Parameter precondition failed"
                        );
                        failures.push(MatchFailure {
                            command: Arc::clone(candidate.matched.command()),
                            result,
                        });
                    }
                }
            }

            settle(&ctx, "parameter preconditions", total, survivors, failures);
            inner.call(ctx).await
        }
        .boxed()
    }
}

// ============================================================================
// PreconditionLayer
// ============================================================================

/// Narrows candidates by command and module preconditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreconditionLayer;

impl<S> Layer<S> for PreconditionLayer {
    type Service = PreconditionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PreconditionService { inner }
    }
}

pub struct PreconditionService<S> {
    inner: S,
}

impl<S: Clone> Clone for PreconditionService<S> {
    fn clone(&self) -> Self {
        PreconditionService {
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for PreconditionService<S>
where
    S: Service<Arc<RequestContext>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<RequestContext>) -> Self::Future {
        let mut inner = self.inner.clone();

        async move {
            if ctx.has_result() {
                return inner.call(ctx).await;
            }

            let all = candidates(&ctx, "preconditions")?;
            let total = all.len();
            let mut survivors = Vec::new();
            let mut failures = Vec::new();
            for candidate in all {
                let command = Arc::clone(candidate.matched.command());
                match check_command(&ctx, &command).await {
                    None => survivors.push(candidate),
                    Some(result) => {
                        debug!(command = command.name(), "Precondition failed");
                        failures.push(MatchFailure { command, result });
                    }
                }
            }

            settle(&ctx, "preconditions", total, survivors, failures);
            inner.call(ctx).await
        }
        .boxed()
    }
}
