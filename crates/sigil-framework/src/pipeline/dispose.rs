//! Dispose stage: the outermost wrapper of every request.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::trace;

use sigil_core::RequestContext;

use super::state::{DeferredDispose, LaunchGate, Settled};

/// Finishes a request once the inner stages returned.
///
/// Records the result as it stands, releases a detached command waiting for
/// it, and sweeps the request's disposables when `auto_dispose` is on.
/// Requests whose command runs detached are swept by that command instead.
#[derive(Debug, Clone, Copy)]
pub struct DisposeLayer {
    auto_dispose: bool,
}

impl DisposeLayer {
    pub fn new(auto_dispose: bool) -> Self {
        Self { auto_dispose }
    }
}

impl<S> Layer<S> for DisposeLayer {
    type Service = DisposeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DisposeService {
            auto_dispose: self.auto_dispose,
            inner,
        }
    }
}

pub struct DisposeService<S> {
    auto_dispose: bool,
    inner: S,
}

impl<S: Clone> Clone for DisposeService<S> {
    fn clone(&self) -> Self {
        DisposeService {
            auto_dispose: self.auto_dispose,
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for DisposeService<S>
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
        let auto_dispose = self.auto_dispose;
        let mut inner = self.inner.clone();

        async move {
            let outcome = inner.call(Arc::clone(&ctx)).await;

            ctx.set_state(Settled(ctx.result()));
            if let Some(LaunchGate(gate)) = ctx.take_state::<LaunchGate>() {
                let _ = gate.send(());
            }

            if auto_dispose && !ctx.has_state::<DeferredDispose>() {
                trace!(request_id = ctx.id(), "Disposing request");
                ctx.dispose().await;
            }
            outcome
        }
        .boxed()
    }
}
