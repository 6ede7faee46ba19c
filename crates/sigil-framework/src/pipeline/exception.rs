//! Exception stage: converts faults of the inner stages into results.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::{error, warn};

use sigil_core::{CommandResult, DispatchError, HandlerFault, RequestContext};

use super::state::Candidates;
use crate::filter::{ExceptionFilters, FilterProvider};

/// Catches errors and panics raised below it.
///
/// [`DispatchError`]s are usage errors and pass through unchanged. A fault
/// in a request that entered this stage with its result already set escapes
/// as [`DispatchError::FaultAfterCompletion`]. Every other fault, including
/// one raised by a result filter, clears the candidate state, is stored as
/// the request's exception and becomes a [`CommandResult::Exception`], after
/// which the exception filters run. A failure of the exception filters
/// escapes as [`DispatchError::ExceptionFilterFailed`].
#[derive(Clone)]
pub struct ExceptionLayer {
    filters: Arc<FilterProvider>,
}

impl ExceptionLayer {
    pub fn new(filters: Arc<FilterProvider>) -> Self {
        Self { filters }
    }
}

impl<S> Layer<S> for ExceptionLayer {
    type Service = ExceptionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExceptionService {
            filters: Arc::clone(&self.filters),
            inner,
        }
    }
}

pub struct ExceptionService<S> {
    filters: Arc<FilterProvider>,
    inner: S,
}

impl<S: Clone> Clone for ExceptionService<S> {
    fn clone(&self) -> Self {
        ExceptionService {
            filters: Arc::clone(&self.filters),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for ExceptionService<S>
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
        let filters = Arc::clone(&self.filters);
        let mut inner = self.inner.clone();

        async move {
            let settled_on_entry = ctx.has_result();
            let fault = match AssertUnwindSafe(inner.call(Arc::clone(&ctx)))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) if e.is::<DispatchError>() => return Err(e),
                Ok(Err(e)) => HandlerFault::from(e),
                Err(panic) => HandlerFault::from_panic(panic),
            };

            if settled_on_entry {
                error!(error = %fault, "Fault raised after the result was set");
                return Err(DispatchError::FaultAfterCompletion(fault).into());
            }

            warn!(error = %fault, "Command faulted");
            ctx.take_state::<Candidates>();
            ctx.clear_arguments();
            ctx.set_exception(fault.clone());
            ctx.set_result(CommandResult::exception(fault));

            let chain = filters.dispatch::<ExceptionFilters>()?;
            match AssertUnwindSafe(chain(Arc::clone(&ctx))).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(DispatchError::ExceptionFilterFailed(e.into()).into()),
                Err(panic) => Err(DispatchError::ExceptionFilterFailed(
                    HandlerFault::from_panic(panic),
                )
                .into()),
            }
        }
        .boxed()
    }
}
