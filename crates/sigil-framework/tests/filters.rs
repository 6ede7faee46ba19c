//! Result and exception filters driven by real dispatches.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sigil_core::{
    BoxError, Command, CommandResult, DispatchError, Invoker, ModuleBuilder, RequestContext,
    ResultKind, ServiceCollection,
};
use sigil_framework::{
    Dispatcher, ExceptionFilters, Filter, FilterDescriptor, LogResultFilter, Next, ResultFilters,
};

fn app() -> ModuleBuilder {
    ModuleBuilder::new("app")
        .alias("app")
        .command(Command::builder(
            "ok",
            Invoker::object(|_| Ok::<_, BoxError>(1_i64)),
        ))
        .command(Command::builder(
            "fail",
            Invoker::void(|_| Err::<(), BoxError>("boom".into())),
        ))
}

/// Counts the results it sees, by kind.
#[derive(Default)]
struct Tally {
    results: AtomicUsize,
    exceptions: AtomicUsize,
}

#[async_trait]
impl Filter<ResultFilters> for Tally {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        self.results.fetch_add(1, Ordering::SeqCst);
        next.run(ctx).await
    }
}

#[async_trait]
impl Filter<ExceptionFilters> for Tally {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        self.exceptions.fetch_add(1, Ordering::SeqCst);
        next.run(ctx).await
    }
}

#[tokio::test]
async fn test_filters_see_results_and_exceptions() {
    let tally = Arc::new(Tally::default());
    let services = ServiceCollection::new()
        .singleton_arc(Arc::clone(&tally))
        .build();
    let dispatcher = Dispatcher::builder()
        .services(services)
        .module(app().build().unwrap())
        .filter(
            FilterDescriptor::service::<Tally>()
                .serves::<ResultFilters>()
                .serves::<ExceptionFilters>()
                .build()
                .unwrap(),
        )
        .filter(
            FilterDescriptor::instance(LogResultFilter)
                .serves::<ResultFilters>()
                .serves::<ExceptionFilters>()
                .build()
                .unwrap(),
        )
        .build();

    assert!(dispatcher.execute("app ok").await.unwrap().is_success());
    let failed = dispatcher.execute("app fail").await.unwrap();
    assert_eq!(failed.kind(), ResultKind::Exception);

    assert_eq!(tally.results.load(Ordering::SeqCst), 1);
    assert_eq!(tally.exceptions.load(Ordering::SeqCst), 1);
    // The registry never owns service filters.
    assert_eq!(Arc::strong_count(&tally), 2);
}

static TRANSIENT_DROPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Transient;

impl Drop for Transient {
    fn drop(&mut self) {
        TRANSIENT_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Filter<ResultFilters> for Transient {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        next.run(ctx).await
    }
}

#[tokio::test]
async fn test_type_filters_are_dropped_after_each_use() {
    let dispatcher = Dispatcher::builder()
        .module(app().build().unwrap())
        .filter(
            FilterDescriptor::of_type::<Transient>()
                .serves::<ResultFilters>()
                .build()
                .unwrap(),
        )
        .build();

    for _ in 0..3 {
        dispatcher.execute("app ok").await.unwrap();
    }
    assert_eq!(TRANSIENT_DROPS.load(Ordering::SeqCst), 3);
}

/// Records its tag into the request state, then continues.
struct Tag(&'static str);

#[async_trait]
impl Filter<ResultFilters> for Tag {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        let mut tags = ctx.take_state::<Vec<&'static str>>().unwrap_or_default();
        tags.push(self.0);
        ctx.set_state(tags);
        next.run(ctx).await
    }
}

struct Check(Arc<parking_lot::Mutex<Vec<&'static str>>>);

#[async_trait]
impl Filter<ResultFilters> for Check {
    async fn call(&self, ctx: Arc<RequestContext>, next: Next<RequestContext>) -> Result<(), BoxError> {
        *self.0.lock() = ctx.get_state::<Vec<&'static str>>().unwrap_or_default();
        next.run(ctx).await
    }
}

#[tokio::test]
async fn test_filters_run_in_order() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let dispatcher = Dispatcher::builder()
        .module(app().build().unwrap())
        .filter(FilterDescriptor::instance(Tag("late")).order(10).serves::<ResultFilters>().build().unwrap())
        .filter(FilterDescriptor::instance(Tag("early")).order(-10).serves::<ResultFilters>().build().unwrap())
        .filter(
            FilterDescriptor::instance(Check(Arc::clone(&seen)))
                .order(100)
                .serves::<ResultFilters>()
                .build()
                .unwrap(),
        )
        .build();

    dispatcher.execute("app ok").await.unwrap();
    assert_eq!(*seen.lock(), ["early", "late"]);
}

struct Failing;

#[async_trait]
impl Filter<ResultFilters> for Failing {
    async fn call(&self, _ctx: Arc<RequestContext>, _next: Next<RequestContext>) -> Result<(), BoxError> {
        Err("result filter failed".into())
    }
}

#[async_trait]
impl Filter<ExceptionFilters> for Failing {
    async fn call(&self, _ctx: Arc<RequestContext>, _next: Next<RequestContext>) -> Result<(), BoxError> {
        Err("exception filter failed".into())
    }
}

#[tokio::test]
async fn test_result_filter_fault_becomes_exception() {
    let tally = Arc::new(Tally::default());
    let dispatcher = Dispatcher::builder()
        .services(ServiceCollection::new().singleton_arc(Arc::clone(&tally)).build())
        .module(app().build().unwrap())
        .filter(FilterDescriptor::instance(Failing).serves::<ResultFilters>().build().unwrap())
        .filter(
            FilterDescriptor::service::<Tally>()
                .serves::<ExceptionFilters>()
                .build()
                .unwrap(),
        )
        .build();

    match dispatcher.execute("app ok").await.unwrap() {
        CommandResult::Exception { reason, .. } => assert!(reason.contains("result filter failed")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(tally.exceptions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exception_filter_fault_escapes() {
    let dispatcher = Dispatcher::builder()
        .module(app().build().unwrap())
        .filter(FilterDescriptor::instance(Failing).serves::<ExceptionFilters>().build().unwrap())
        .build();

    let err = dispatcher.execute("app fail").await.unwrap_err();
    assert!(matches!(err, DispatchError::ExceptionFilterFailed(_)));
}

#[tokio::test]
async fn test_filters_can_change_between_requests() {
    let tally = Arc::new(Tally::default());
    let services = ServiceCollection::new()
        .singleton_arc(Arc::clone(&tally))
        .build();
    let dispatcher = Dispatcher::builder()
        .services(services)
        .module(app().build().unwrap())
        .build();

    dispatcher.execute("app ok").await.unwrap();
    let id = dispatcher.filters().add(
        FilterDescriptor::service::<Tally>()
            .serves::<ResultFilters>()
            .build()
            .unwrap(),
    );
    dispatcher.execute("app ok").await.unwrap();
    dispatcher.filters().remove(id).unwrap();
    dispatcher.execute("app ok").await.unwrap();

    assert_eq!(tally.results.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_during_filter_churn() {
    let tally = Arc::new(Tally::default());
    let services = ServiceCollection::new()
        .singleton_arc(Arc::clone(&tally))
        .build();
    let dispatcher = Arc::new(
        Dispatcher::builder()
            .services(services)
            .module(app().build().unwrap())
            .build(),
    );

    let churn = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            for _ in 0..200 {
                let id = dispatcher.filters().add(
                    FilterDescriptor::service::<Tally>()
                        .serves::<ResultFilters>()
                        .build()
                        .unwrap(),
                );
                tokio::task::yield_now().await;
                dispatcher.filters().remove(id).unwrap();
            }
        })
    };

    let mut requests = Vec::new();
    for _ in 0..8 {
        let dispatcher = Arc::clone(&dispatcher);
        requests.push(tokio::spawn(async move {
            for _ in 0..50 {
                let result = dispatcher.execute("app ok").await.unwrap();
                assert!(matches!(result, CommandResult::Success(_)));
            }
        }));
    }

    churn.await.unwrap();
    for request in requests {
        request.await.unwrap();
    }
    assert!(tally.results.load(Ordering::SeqCst) <= 400);
}
