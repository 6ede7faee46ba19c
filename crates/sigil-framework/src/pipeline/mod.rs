//! The request pipeline.
//!
//! Every request flows through a fixed stack of tower services over
//! `Arc<RequestContext>`, outermost first:
//!
//! ```text
//! DisposeLayer           settles the result, sweeps disposables
//!   ExceptionLayer       faults -> CommandResult::Exception + exception filters
//!     (custom layers)
//!       blank input guard
//!       StringMatcherLayer
//!       InputCountLayer
//!       ArgumentParserLayer
//!       ParamPreconditionLayer
//!       PreconditionLayer
//!       ExecutorLayer        handler + result filters
//!         terminal
//! ```
//!
//! Each stage passes the request through unchanged once a result is set, so
//! a stage that decides the outcome simply stores it and calls the next.
//! Candidates of an ambiguous match travel between stages as [`Candidates`]
//! in the context's state.

mod count;
mod dispose;
mod exception;
mod execute;
mod matcher;
mod parse;
mod precondition;
mod state;

use std::fmt;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Layer, Service, ServiceBuilder, service_fn};

use sigil_core::{ArgumentParser, DispatchConfig, RequestContext};

use crate::filter::FilterProvider;
use crate::matching::ModuleCache;

pub use count::{InputCountLayer, InputCountService, arity_accepts};
pub use dispose::{DisposeLayer, DisposeService};
pub use exception::{ExceptionLayer, ExceptionService};
pub use execute::{ExecutorLayer, ExecutorService};
pub use matcher::{BlankInputPredicate, StringMatcherLayer, StringMatcherService, reject_blank_input};
pub use parse::{ArgumentParserLayer, ArgumentParserService};
pub use precondition::{
    ParamPreconditionLayer, ParamPreconditionService, PreconditionLayer, PreconditionService,
};
pub use state::{Candidate, Candidates};

pub(crate) use state::Settled;

/// A type-erased pipeline, or a part of one.
pub type Pipeline = BoxCloneSyncService<Arc<RequestContext>, (), BoxError>;

type CustomLayer = Arc<dyn Fn(Pipeline) -> Pipeline + Send + Sync>;

/// Assembles the stage stack.
///
/// Custom layers run between the exception stage and the string matcher,
/// in the order they were added, outermost first.
#[derive(Clone, Default)]
pub struct PipelineBuilder {
    layers: Vec<CustomLayer>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom tower layer.
    ///
    /// ```rust,ignore
    /// let pipeline = PipelineBuilder::new()
    ///     .layer(tower::filter::FilterLayer::new(OnlyFromConsole))
    ///     .build(&parts);
    /// ```
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<Pipeline> + Send + Sync + 'static,
        L::Service: Service<Arc<RequestContext>, Response = (), Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Arc<RequestContext>>>::Future: Send + 'static,
    {
        self.layers
            .push(Arc::new(move |inner| BoxCloneSyncService::new(layer.layer(inner))));
        self
    }

    /// Number of custom layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Builds the full stack over `parts`.
    pub fn build(&self, parts: &PipelineParts) -> Pipeline {
        let core = ServiceBuilder::new()
            .layer(reject_blank_input())
            .layer(StringMatcherLayer::new(Arc::clone(&parts.cache)))
            .layer(InputCountLayer::new(Arc::clone(&parts.config)))
            .layer(ArgumentParserLayer::new(
                Arc::clone(&parts.config),
                Arc::clone(&parts.parser),
            ))
            .layer(ParamPreconditionLayer)
            .layer(PreconditionLayer)
            .layer(ExecutorLayer::new(
                Arc::clone(&parts.config),
                Arc::clone(&parts.filters),
                parts.tracker.clone(),
            ))
            .service(service_fn(|_ctx: Arc<RequestContext>| async {
                Ok::<(), BoxError>(())
            }));

        let mut pipeline = BoxCloneSyncService::new(core);
        for layer in self.layers.iter().rev() {
            pipeline = layer(pipeline);
        }

        BoxCloneSyncService::new(
            ServiceBuilder::new()
                .layer(DisposeLayer::new(parts.config.auto_dispose))
                .layer(ExceptionLayer::new(Arc::clone(&parts.filters)))
                .service(pipeline),
        )
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("layers", &self.layers.len())
            .finish()
    }
}

/// The shared components the stages run against.
#[derive(Clone)]
pub struct PipelineParts {
    pub config: Arc<DispatchConfig>,
    pub cache: Arc<ModuleCache>,
    pub parser: Arc<dyn ArgumentParser>,
    pub filters: Arc<FilterProvider>,
    pub tracker: TaskTracker,
}

impl fmt::Debug for PipelineParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineParts")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use sigil_core::{CommandResult, DispatchError, ServiceCollection, StringComparison};
    use tower::ServiceExt;

    use crate::filter::FilterRegistry;
    use crate::parsing::{DefaultArgumentParser, TypeParserRegistry};

    fn parts() -> PipelineParts {
        PipelineParts {
            config: Arc::new(DispatchConfig::default()),
            cache: Arc::new(ModuleCache::new(StringComparison::Ordinal, ' ')),
            parser: Arc::new(DefaultArgumentParser::new(
                Arc::new(TypeParserRegistry::with_defaults()),
                ' ',
            )),
            filters: Arc::new(FilterProvider::with_defaults(Arc::new(FilterRegistry::new()))),
            tracker: TaskTracker::new(),
        }
    }

    /// A context whose result is already decided.
    fn seeded(input: &str) -> Arc<RequestContext> {
        let ctx = Arc::new(RequestContext::new(input, ServiceCollection::new().build()));
        ctx.set_result(CommandResult::success_with(42_i64));
        ctx
    }

    fn assert_untouched(ctx: &RequestContext) {
        let result = ctx.result().expect("result slot emptied");
        assert!(result.is_success());
        assert_eq!(result.value().and_then(|v| v.downcast_ref::<i64>()), Some(&42));
    }

    /// A terminal service flagging that the request reached it.
    fn terminal() -> (Pipeline, Arc<AtomicBool>) {
        let reached = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let service = service_fn(move |_ctx: Arc<RequestContext>| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        (BoxCloneSyncService::new(service), reached)
    }

    async fn assert_passes_through<L>(layer: L, input: &str)
    where
        L: Layer<Pipeline>,
        L::Service: Service<Arc<RequestContext>, Response = (), Error = BoxError>,
    {
        let (inner, reached) = terminal();
        let ctx = seeded(input);
        layer.layer(inner).oneshot(Arc::clone(&ctx)).await.unwrap();
        assert!(reached.load(Ordering::SeqCst), "inner service was skipped");
        assert_untouched(&ctx);
    }

    #[tokio::test]
    async fn test_blank_guard_passes_decided_requests() {
        assert_passes_through(reject_blank_input(), "   ").await;
    }

    #[tokio::test]
    async fn test_blank_guard_rejects_undecided_blank_input() {
        let (inner, reached) = terminal();
        let ctx = Arc::new(RequestContext::new(" \t ", ServiceCollection::new().build()));
        let err = reject_blank_input().layer(inner).oneshot(ctx).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::BlankInput)
        ));
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_every_stage_passes_decided_requests() {
        let parts = parts();
        assert_passes_through(StringMatcherLayer::new(Arc::clone(&parts.cache)), "math add 1 2")
            .await;
        assert_passes_through(InputCountLayer::new(Arc::clone(&parts.config)), "math add 1 2")
            .await;
        assert_passes_through(
            ArgumentParserLayer::new(Arc::clone(&parts.config), Arc::clone(&parts.parser)),
            "math add 1 2",
        )
        .await;
        assert_passes_through(ParamPreconditionLayer, "math add 1 2").await;
        assert_passes_through(PreconditionLayer, "math add 1 2").await;
        assert_passes_through(
            ExecutorLayer::new(
                Arc::clone(&parts.config),
                Arc::clone(&parts.filters),
                parts.tracker.clone(),
            ),
            "math add 1 2",
        )
        .await;
        assert_passes_through(ExceptionLayer::new(Arc::clone(&parts.filters)), "math add 1 2")
            .await;
        assert_passes_through(DisposeLayer::new(true), "math add 1 2").await;
    }

    #[tokio::test]
    async fn test_full_stack_passes_decided_blank_request() {
        let pipeline = PipelineBuilder::new().build(&parts());
        let ctx = seeded("   ");
        pipeline.oneshot(Arc::clone(&ctx)).await.unwrap();
        assert_untouched(&ctx);
    }

    #[tokio::test]
    async fn test_fault_of_decided_request_escapes() {
        let failing = service_fn(|_ctx: Arc<RequestContext>| async {
            Err::<(), BoxError>("late fault".into())
        });
        let ctx = seeded("math add 1 2");
        let err = ExceptionLayer::new(Arc::clone(&parts().filters))
            .layer(failing)
            .oneshot(Arc::clone(&ctx))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DispatchError>(),
            Some(DispatchError::FaultAfterCompletion(_))
        ));
        assert_untouched(&ctx);
    }
}
