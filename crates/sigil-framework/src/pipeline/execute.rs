//! Executor stage: runs the chosen command.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use tokio_util::task::TaskTracker;
use tower::{BoxError, Layer, Service};
use tracing::{Instrument, debug, error};

use sigil_core::{
    Arguments, AsyncHandle, Command, CommandCall, CommandResult, DispatchConfig, DispatchError,
    HandlerFault, ModuleInstance, RequestContext, RunMode,
};

use super::parse::highest_priority;
use super::state::{DeferredDispose, LaunchGate, candidates};
use crate::filter::{ExceptionFilters, FilterProvider, ResultFilters};

/// Runs the module hooks and the handler of `command`.
async fn invoke(
    ctx: Arc<RequestContext>,
    command: Arc<Command>,
    arguments: Arguments,
    module: Option<ModuleInstance>,
) -> Result<CommandResult, BoxError> {
    if let Some(module) = &module {
        module.hooks().before_execute(&ctx, &command).await?;
    }
    let call = CommandCall {
        context: Arc::clone(&ctx),
        command: Arc::clone(&command),
        arguments,
        module: module.clone(),
    };
    let result = command.invoker().invoke(call).await?;
    if let Some(module) = &module {
        module.hooks().after_execute(&ctx, &command, &result).await?;
    }
    Ok(result)
}

/// Runs the result chain, or the exception chain for an exception result.
pub(crate) async fn run_filters(
    filters: &FilterProvider,
    ctx: Arc<RequestContext>,
) -> Result<(), BoxError> {
    let is_exception = matches!(ctx.result(), Some(CommandResult::Exception { .. }));
    if is_exception {
        filters.dispatch::<ExceptionFilters>()?(ctx).await
    } else {
        filters.dispatch::<ResultFilters>()?(ctx).await
    }
}

/// Picks the highest priority candidate and executes it.
///
/// Under [`RunMode::Sequential`] the handler is awaited, its result stored
/// and the result filters run before the request continues. Under
/// [`RunMode::Concurrent`] the handler is detached onto the dispatcher's
/// [`TaskTracker`] and the request ends with [`CommandResult::Async`]; the
/// detached task converts faults into exception results itself and owns the
/// request's disposal.
#[derive(Clone)]
pub struct ExecutorLayer {
    config: Arc<DispatchConfig>,
    filters: Arc<FilterProvider>,
    tracker: TaskTracker,
}

impl ExecutorLayer {
    pub fn new(config: Arc<DispatchConfig>, filters: Arc<FilterProvider>, tracker: TaskTracker) -> Self {
        Self {
            config,
            filters,
            tracker,
        }
    }
}

impl<S> Layer<S> for ExecutorLayer {
    type Service = ExecutorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExecutorService {
            config: Arc::clone(&self.config),
            filters: Arc::clone(&self.filters),
            tracker: self.tracker.clone(),
            inner,
        }
    }
}

pub struct ExecutorService<S> {
    config: Arc<DispatchConfig>,
    filters: Arc<FilterProvider>,
    tracker: TaskTracker,
    inner: S,
}

impl<S: Clone> Clone for ExecutorService<S> {
    fn clone(&self) -> Self {
        ExecutorService {
            config: Arc::clone(&self.config),
            filters: Arc::clone(&self.filters),
            tracker: self.tracker.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for ExecutorService<S>
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
        let filters = Arc::clone(&self.filters);
        let tracker = self.tracker.clone();
        let mut inner = self.inner.clone();

        async move {
            if ctx.has_result() {
                return inner.call(ctx).await;
            }

            let chosen = highest_priority(candidates(&ctx, "executor")?).ok_or(
                DispatchError::MissingState {
                    stage: "executor",
                    missing: "a surviving candidate",
                },
            )?;
            let arguments = chosen.arguments.ok_or(DispatchError::MissingState {
                stage: "executor",
                missing: "parsed arguments",
            })?;
            let command = Arc::clone(chosen.matched.command());
            ctx.set_command(Arc::clone(&command), chosen.matched.alias());
            ctx.set_arguments(arguments.clone());

            let module = match command.module().and_then(|m| m.effective_activator()) {
                Some(activator) => {
                    let (instance, activated) = activator.resolve(ctx.services().as_ref());
                    if activated {
                        ctx.register_for_dispose_async(Box::new(instance.clone()))
                            .await;
                    }
                    Some(instance)
                }
                None => None,
            };

            match command.effective_run_mode(&config) {
                RunMode::Sequential => {
                    debug!(command = command.name(), "Executing command");
                    let result = invoke(Arc::clone(&ctx), command, arguments, module).await?;
                    ctx.set_result(result);
                    run_filters(&filters, Arc::clone(&ctx)).await?;
                }
                RunMode::Concurrent => {
                    debug!(command = command.name(), "Detaching command");
                    let (gate, launched) = oneshot::channel::<()>();
                    let task = detached(
                        Arc::clone(&ctx),
                        command,
                        arguments,
                        module,
                        filters,
                        config.auto_dispose,
                        launched,
                    );
                    let join = tracker.spawn(task.in_current_span());
                    ctx.set_state(DeferredDispose);
                    ctx.set_state(LaunchGate(gate));
                    ctx.set_result(CommandResult::Async(AsyncHandle::new(
                        async move {
                            match join.await {
                                Ok(result) => result,
                                Err(e) => CommandResult::exception(HandlerFault::Panic(e.to_string())),
                            }
                        }
                        .boxed(),
                    )));
                }
            }
            inner.call(ctx).await
        }
        .boxed()
    }
}

/// The body of a concurrently running command.
async fn detached(
    ctx: Arc<RequestContext>,
    command: Arc<Command>,
    arguments: Arguments,
    module: Option<ModuleInstance>,
    filters: Arc<FilterProvider>,
    auto_dispose: bool,
    launched: oneshot::Receiver<()>,
) -> CommandResult {
    // Either outcome means the dispatcher is done with the result slot.
    let _ = launched.await;

    let outcome = AssertUnwindSafe(invoke(Arc::clone(&ctx), command, arguments, module))
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            let fault = HandlerFault::from(e);
            ctx.set_exception(fault.clone());
            CommandResult::exception(fault)
        }
        Err(panic) => {
            let fault = HandlerFault::from_panic(panic);
            ctx.set_exception(fault.clone());
            CommandResult::exception(fault)
        }
    };
    ctx.set_result(result.clone());

    let filtered = AssertUnwindSafe(run_filters(&filters, Arc::clone(&ctx)))
        .catch_unwind()
        .await;
    match filtered {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Filter chain of a detached command failed"),
        Err(panic) => error!(
            error = %HandlerFault::from_panic(panic),
            "Filter chain of a detached command panicked"
        ),
    }

    if auto_dispose {
        ctx.dispose().await;
    }
    result
}
