//! String matcher stage: turns raw input into candidates.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::filter::{FilterLayer, Predicate};
use tower::{BoxError, Layer, Service};
use tracing::debug;

use sigil_core::{CommandResult, DispatchError, RequestContext};

use super::state::{Candidate, Candidates, store};
use crate::matching::ModuleCache;

// ============================================================================
// BlankInputPredicate
// ============================================================================

/// Rejects blank input with [`DispatchError::BlankInput`].
///
/// Requests that already carry a command or a result pass untouched, like
/// every other stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankInputPredicate;

impl Predicate<Arc<RequestContext>> for BlankInputPredicate {
    type Request = Arc<RequestContext>;

    fn check(&mut self, request: Arc<RequestContext>) -> Result<Arc<RequestContext>, BoxError> {
        if request.has_result() || request.command().is_some() {
            return Ok(request);
        }
        if request.raw_input().trim().is_empty() {
            Err(Box::new(DispatchError::BlankInput))
        } else {
            Ok(request)
        }
    }
}

/// The blank-input guard placed in front of the string matcher.
pub fn reject_blank_input() -> FilterLayer<BlankInputPredicate> {
    FilterLayer::new(BlankInputPredicate)
}

// ============================================================================
// StringMatcherLayer
// ============================================================================

/// Searches the alias index for the raw input.
///
/// - No match: [`CommandResult::CommandNotFound`].
/// - One match: committed, or [`CommandResult::CommandDisabled`] if disabled.
/// - Several matches: stashed as [`Candidates`] for the following stages.
///
/// Passes through untouched when a command or result is already set.
#[derive(Clone)]
pub struct StringMatcherLayer {
    cache: Arc<ModuleCache>,
}

impl StringMatcherLayer {
    pub fn new(cache: Arc<ModuleCache>) -> Self {
        Self { cache }
    }
}

impl<S> Layer<S> for StringMatcherLayer {
    type Service = StringMatcherService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StringMatcherService {
            cache: Arc::clone(&self.cache),
            inner,
        }
    }
}

pub struct StringMatcherService<S> {
    cache: Arc<ModuleCache>,
    inner: S,
}

impl<S: Clone> Clone for StringMatcherService<S> {
    fn clone(&self) -> Self {
        StringMatcherService {
            cache: Arc::clone(&self.cache),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for StringMatcherService<S>
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
        let cache = Arc::clone(&self.cache);
        let mut inner = self.inner.clone();

        async move {
            if ctx.has_result() || ctx.command().is_some() {
                return inner.call(ctx).await;
            }

            let mut matches = cache.search(ctx.raw_input());
            debug!(matches = matches.len(), "String matcher searched aliases");
            match matches.len() {
                0 => ctx.set_result(CommandResult::CommandNotFound {
                    input: ctx.raw_input().to_string(),
                }),
                1 => {
                    let matched = matches.remove(0);
                    if matched.command().is_enabled() {
                        store(&ctx, vec![Candidate::new(matched)]);
                    } else {
                        ctx.set_result(CommandResult::CommandDisabled {
                            command: Arc::clone(matched.command()),
                        });
                    }
                }
                _ => ctx.set_state(Candidates(
                    matches.into_iter().map(Candidate::new).collect(),
                )),
            }
            inner.call(ctx).await
        }
        .boxed()
    }
}
