//! Filters shipped with the framework.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use sigil_core::{BoxError, RequestContext};

use super::kind::{ExceptionFilters, Filter, Next, ResultFilters};

/// Logs every result passing through the chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogResultFilter;

impl LogResultFilter {
    fn log(ctx: &RequestContext) {
        let Some(result) = ctx.result() else {
            return;
        };
        let summary = result.summary();
        if summary.success {
            info!(
                request_id = ctx.id(),
                command = summary.command.as_deref().unwrap_or(""),
                "Command succeeded"
            );
        } else {
            warn!(
                request_id = ctx.id(),
                kind = ?summary.kind,
                command = summary.command.as_deref().unwrap_or(""),
                reason = summary.reason.as_deref().unwrap_or(""),
                "Command failed"
            );
        }
    }
}

#[async_trait]
impl Filter<ResultFilters> for LogResultFilter {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        Self::log(&ctx);
        next.run(ctx).await
    }
}

#[async_trait]
impl Filter<ExceptionFilters> for LogResultFilter {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        Self::log(&ctx);
        next.run(ctx).await
    }
}

/// Releases the request's disposables and ends the chain.
///
/// Filters ordered after this one never run.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisposeContextFilter;

#[async_trait]
impl Filter<ResultFilters> for DisposeContextFilter {
    async fn call(&self, ctx: Arc<RequestContext>, _next: Next<RequestContext>) -> Result<(), BoxError> {
        ctx.dispose().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterDescriptor, FilterProvider, FilterRegistry};
    use sigil_core::{CommandResult, ServiceCollection, on_dispose};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_dispose_filter_ends_chain() {
        let provider = FilterProvider::with_defaults(Arc::new(FilterRegistry::new()));
        provider.add(
            FilterDescriptor::instance(DisposeContextFilter)
                .serves::<ResultFilters>()
                .build()
                .unwrap(),
        );
        provider.add(
            FilterDescriptor::instance(LogResultFilter)
                .order(1)
                .serves::<ResultFilters>()
                .serves::<ExceptionFilters>()
                .build()
                .unwrap(),
        );

        let released = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(RequestContext::new("x", ServiceCollection::new().build()));
        let flag = Arc::clone(&released);
        ctx.register_for_dispose(Box::new(on_dispose(move || flag.store(true, Ordering::SeqCst))));
        ctx.set_result(CommandResult::success());

        provider.dispatch::<ResultFilters>().unwrap()(Arc::clone(&ctx))
            .await
            .unwrap();
        assert!(released.load(Ordering::SeqCst));
        assert!(ctx.is_disposed());
    }
}
