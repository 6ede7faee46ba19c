//! The dispatcher: entry point of the Sigil framework.
//!
//! A [`Dispatcher`] owns the alias index, the filter registry and the
//! assembled pipeline. Each call to [`Dispatcher::execute`] creates a fresh
//! [`RequestContext`] on its own service scope, runs it through the pipeline
//! and returns the request's [`CommandResult`].
//!
//! ```rust,ignore
//! use sigil_framework::prelude::*;
//!
//! let dispatcher = Dispatcher::builder()
//!     .config(DispatchConfig::default())
//!     .module(math_module()?)
//!     .filter(
//!         FilterDescriptor::instance(LogResultFilter)
//!             .serves::<ResultFilters>()
//!             .serves::<ExceptionFilters>()
//!             .build()?,
//!     )
//!     .build();
//!
//! let result = dispatcher.execute("math add 2 3").await?;
//! assert_eq!(result.value().and_then(|v| v.downcast_ref::<i64>()), Some(&5));
//! ```

use std::fmt;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tower::{BoxError, Layer, Service, ServiceExt};
use tracing::{Instrument, Level, debug, info, span};

use sigil_core::{
    ArgumentParser, CommandResult, DispatchConfig, DispatchError, DispatchResult, HandlerFault,
    Module, RequestContext, ServiceCollection, ServiceProvider,
};

use crate::filter::{FilterDescriptor, FilterProvider, FilterRegistry};
use crate::matching::ModuleCache;
use crate::parsing::{DefaultArgumentParser, TypeParserRegistry};
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineParts, Settled};

/// Resolves text input to commands and runs them.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync`; share it behind an `Arc` to execute
/// requests from several tasks at once.
pub struct Dispatcher {
    config: Arc<DispatchConfig>,
    services: Arc<dyn ServiceProvider>,
    cache: Arc<ModuleCache>,
    filters: Arc<FilterProvider>,
    tracker: TaskTracker,
    pipeline: Pipeline,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatches one input.
    ///
    /// # Errors
    ///
    /// Usage errors only: blank input, missing services, unserved filter
    /// kinds, faults raised after the result was set and failures of the
    /// exception filters. Every domain outcome, handler faults included, is
    /// a [`CommandResult`].
    pub async fn execute(&self, input: &str) -> DispatchResult<CommandResult> {
        if input.trim().is_empty() {
            return Err(DispatchError::BlankInput);
        }

        let ctx = Arc::new(RequestContext::new(input, self.services.create_scope()));
        let span = span!(Level::DEBUG, "dispatch", request_id = ctx.id(), input);

        let outcome = self
            .pipeline
            .clone()
            .oneshot(Arc::clone(&ctx))
            .instrument(span.clone())
            .await;
        let _enter = span.enter();
        outcome.map_err(into_dispatch_error)?;

        let result = ctx
            .take_state::<Settled>()
            .and_then(|Settled(result)| result)
            .or_else(|| ctx.result())
            .ok_or(DispatchError::MissingState {
                stage: "dispatcher",
                missing: "a command result",
            })?;
        debug!(kind = ?result.kind(), "Dispatch finished");
        Ok(result)
    }

    /// Registers a top-level module. Returns `false` if it is already
    /// registered.
    pub fn add_module(&self, module: Arc<Module>) -> bool {
        self.cache.add_module(module)
    }

    /// Unregisters a top-level module. Returns `false` if it was not
    /// registered.
    pub fn remove_module(&self, module: &Arc<Module>) -> bool {
        self.cache.remove_module(module)
    }

    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.cache.modules()
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// The filter provider; filters added or removed here take effect on
    /// the next request.
    pub fn filters(&self) -> &Arc<FilterProvider> {
        &self.filters
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn services(&self) -> &Arc<dyn ServiceProvider> {
        &self.services
    }

    /// Tracks commands running under the concurrent run mode.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Stops accepting detached commands and waits for the running ones.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(in_flight = self.tracker.len(), "Waiting for detached commands");
        self.tracker.wait().await;
    }
}

fn into_dispatch_error(err: BoxError) -> DispatchError {
    match err.downcast::<DispatchError>() {
        Ok(err) => *err,
        Err(err) => DispatchError::Pipeline(HandlerFault::from(err)),
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    config: DispatchConfig,
    services: Option<Arc<dyn ServiceProvider>>,
    type_parsers: TypeParserRegistry,
    parser: Option<Arc<dyn ArgumentParser>>,
    modules: Vec<Arc<Module>>,
    filters: Vec<FilterDescriptor>,
    pipeline: PipelineBuilder,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatchConfig::default(),
            services: None,
            type_parsers: TypeParserRegistry::default(),
            parser: None,
            modules: Vec::new(),
            filters: Vec::new(),
            pipeline: PipelineBuilder::new(),
        }
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// The root service provider. Every request runs on its own scope.
    pub fn services(mut self, services: Arc<dyn ServiceProvider>) -> Self {
        self.services = Some(services);
        self
    }

    /// Type parsers used by the default argument parser.
    pub fn type_parsers(mut self, parsers: TypeParserRegistry) -> Self {
        self.type_parsers = parsers;
        self
    }

    /// Replaces the default argument parser.
    pub fn argument_parser(mut self, parser: impl ArgumentParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn module(mut self, module: Arc<Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a custom layer between the exception stage and the string
    /// matcher.
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
        self.pipeline = self.pipeline.layer(layer);
        self
    }

    pub fn build(self) -> Dispatcher {
        let config = Arc::new(self.config);
        let cache = Arc::new(ModuleCache::new(config.comparison, config.separator));
        for module in self.modules {
            cache.add_module(module);
        }

        let registry = Arc::new(FilterRegistry::new());
        registry.mutate(|list| list.extend(self.filters));
        let filters = Arc::new(FilterProvider::with_defaults(registry));

        let parser = self.parser.unwrap_or_else(|| {
            Arc::new(DefaultArgumentParser::new(
                Arc::new(self.type_parsers),
                config.separator,
            ))
        });
        let tracker = TaskTracker::new();
        let parts = PipelineParts {
            config: Arc::clone(&config),
            cache: Arc::clone(&cache),
            parser,
            filters: Arc::clone(&filters),
            tracker: tracker.clone(),
        };
        let pipeline = self.pipeline.build(&parts);

        Dispatcher {
            config,
            services: self
                .services
                .unwrap_or_else(|| ServiceCollection::new().build()),
            cache,
            filters,
            tracker,
            pipeline,
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("modules", &self.modules.len())
            .field("filters", &self.filters.len())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
