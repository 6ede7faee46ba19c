//! Input count stage: rejects candidates whose arity cannot fit the input.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::debug;

use sigil_core::{
    Command, CommandResult, DispatchConfig, MatchFailure, MultiMatchHandling, RequestContext,
};

use super::state::{Candidate, candidates, store};
use crate::parsing::count_args;

/// Returns `true` if `tokens` input tokens can be bound to the parameters of
/// `command`.
pub fn arity_accepts(command: &Command, tokens: usize, config: &DispatchConfig) -> bool {
    if tokens < command.required_count() {
        return false;
    }
    tokens <= command.parameters().len()
        || command.has_variadic()
        || command.effective_ignore_extra_args(config)
}

/// Number of argument tokens in a candidate's remaining input.
fn token_count(candidate: &Candidate, config: &DispatchConfig) -> usize {
    let separator = candidate
        .matched
        .command()
        .module()
        .and_then(|m| m.effective_separator())
        .unwrap_or(config.separator);
    count_args(candidate.matched.remaining(), separator)
}

/// Narrows candidates by arity and enablement.
///
/// When every candidate of a multi-match fails, the request ends with
/// [`CommandResult::MatchesFailed`] if any candidate's module resolves
/// ambiguity with [`MultiMatchHandling::Best`], and with
/// [`CommandResult::MultiMatch`] otherwise.
#[derive(Clone)]
pub struct InputCountLayer {
    config: Arc<DispatchConfig>,
}

impl InputCountLayer {
    pub fn new(config: Arc<DispatchConfig>) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for InputCountLayer {
    type Service = InputCountService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InputCountService {
            config: Arc::clone(&self.config),
            inner,
        }
    }
}

pub struct InputCountService<S> {
    config: Arc<DispatchConfig>,
    inner: S,
}

impl<S: Clone> Clone for InputCountService<S> {
    fn clone(&self) -> Self {
        InputCountService {
            config: Arc::clone(&self.config),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for InputCountService<S>
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
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        async move {
            if ctx.has_result() {
                return inner.call(ctx).await;
            }

            let all = candidates(&ctx, "input count")?;
            let total = all.len();
            let mut survivors = Vec::new();
            let mut failures = Vec::new();
            for candidate in &all {
                let command = Arc::clone(candidate.matched.command());
                let result = if !command.is_enabled() {
                    CommandResult::CommandDisabled {
                        command: Arc::clone(&command),
                    }
                } else if !arity_accepts(&command, token_count(candidate, &config), &config) {
                    CommandResult::BadArgCount {
                        command: Arc::clone(&command),
                    }
                } else {
                    survivors.push(candidate.clone());
                    continue;
                };
                failures.push(MatchFailure { command, result });
            }

            if !survivors.is_empty() {
                debug!(survivors = survivors.len(), total, "Input count narrowed candidates");
                store(&ctx, survivors);
            } else if total == 1 {
                if let Some(failure) = failures.pop() {
                    ctx.set_result(failure.result);
                }
            } else if all.iter().any(|c| {
                c.matched.command().multi_match_handling(&config) == MultiMatchHandling::Best
            }) {
                ctx.set_result(CommandResult::MatchesFailed { failures });
            } else {
                ctx.set_result(CommandResult::MultiMatch {
                    matches: all.into_iter().map(|c| c.matched).collect(),
                });
            }
            inner.call(ctx).await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{BoxError as CoreBoxError, Invoker, ModuleBuilder, Parameter};

    fn command(builder: sigil_core::CommandBuilder) -> Arc<Command> {
        let module = ModuleBuilder::new("m").command(builder).build().unwrap();
        Arc::clone(&module.commands()[0])
    }

    fn noop() -> Invoker {
        Invoker::void(|_| Ok::<_, CoreBoxError>(()))
    }

    #[test]
    fn test_arity_accepts() {
        let config = DispatchConfig::default();
        let add = command(
            Command::builder("add", noop())
                .parameter(Parameter::builder::<i64>("a"))
                .parameter(Parameter::builder::<i64>("b").optional()),
        );
        assert!(!arity_accepts(&add, 0, &config));
        assert!(arity_accepts(&add, 1, &config));
        assert!(arity_accepts(&add, 2, &config));
        assert!(!arity_accepts(&add, 3, &config));

        let lenient = command(
            Command::builder("add", noop())
                .ignore_extra_args(true)
                .parameter(Parameter::builder::<i64>("a")),
        );
        assert!(arity_accepts(&lenient, 5, &config));

        let sum = command(
            Command::builder("sum", noop()).parameter(Parameter::builder::<i64>("v").variadic()),
        );
        assert!(arity_accepts(&sum, 0, &config));
        assert!(arity_accepts(&sum, 9, &config));
    }
}
