//! Filter kinds and the filter contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use sigil_core::{BoxError, RequestContext, ServiceProvider};

/// State a filter chain runs against.
pub trait FilterContext: Send + Sync + 'static {
    /// The services available to service-kind filters.
    fn services(&self) -> &Arc<dyn ServiceProvider>;
}

impl FilterContext for RequestContext {
    fn services(&self) -> &Arc<dyn ServiceProvider> {
        RequestContext::services(self)
    }
}

/// A family of filters sharing one chain and one context type.
pub trait FilterKind: Send + Sync + 'static {
    type Context: FilterContext;

    /// Name used in errors and logs.
    const NAME: &'static str;
}

/// Filters run after a command produced its result.
pub enum ResultFilters {}

impl FilterKind for ResultFilters {
    type Context = RequestContext;
    const NAME: &'static str = "result";
}

/// Filters run after a handler fault was converted into an exception result.
pub enum ExceptionFilters {}

impl FilterKind for ExceptionFilters {
    type Context = RequestContext;
    const NAME: &'static str = "exception";
}

/// Future returned by every link of a filter chain.
pub type FilterFuture = BoxFuture<'static, Result<(), BoxError>>;

/// A composed filter chain, or the rest of one.
pub type FilterDelegate<C> = Arc<dyn Fn(Arc<C>) -> FilterFuture + Send + Sync>;

/// The remainder of the chain after the current filter.
pub struct Next<C> {
    delegate: FilterDelegate<C>,
}

impl<C> Next<C> {
    pub(crate) fn new(delegate: FilterDelegate<C>) -> Self {
        Self { delegate }
    }

    /// Runs the rest of the chain.
    pub async fn run(self, ctx: Arc<C>) -> Result<(), BoxError> {
        (self.delegate)(ctx).await
    }
}

impl<C> Clone for Next<C> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
        }
    }
}

impl<C> fmt::Debug for Next<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

/// A link in the chain of filter kind `K`.
///
/// A filter decides whether the rest of the chain runs by calling
/// [`Next::run`].
///
/// ```rust,ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Filter<ResultFilters> for Audit {
///     async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
///         info!(id = ctx.id(), "command finished");
///         next.run(ctx).await
///     }
/// }
/// ```
#[async_trait]
pub trait Filter<K: FilterKind>: Send + Sync + 'static {
    async fn call(&self, ctx: Arc<K::Context>, next: Next<K::Context>) -> Result<(), BoxError>;
}
