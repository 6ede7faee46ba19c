//! Composes registered filters into one delegate per filter kind.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use sigil_core::BoxError;

use super::kind::{FilterDelegate, FilterKind, Next};
use super::registry::{FilterChange, FilterRegistry, FilterSubscriber};

/// Owns the composed chain of filter kind `K`.
///
/// The chain is built lazily on first use and rebuilt when the registry
/// reports a change affecting `K`. At most one rebuild runs at a time; callers
/// arriving during a rebuild wait for it and receive the new chain.
pub struct FilterChainFactory<K: FilterKind> {
    registry: Arc<FilterRegistry>,
    delegate: RwLock<Option<FilterDelegate<K::Context>>>,
    rebuild: Mutex<()>,
    rebuilding: AtomicBool,
    builds: AtomicU64,
}

impl<K: FilterKind> FilterChainFactory<K> {
    /// Creates a factory and subscribes it to `registry`.
    pub fn new(registry: Arc<FilterRegistry>) -> Arc<Self> {
        let factory = Arc::new(Self {
            registry: Arc::clone(&registry),
            delegate: RwLock::new(None),
            rebuild: Mutex::new(()),
            rebuilding: AtomicBool::new(false),
            builds: AtomicU64::new(0),
        });
        let weak = Arc::downgrade(&factory);
        registry.subscribe(weak);
        factory
    }

    /// The composed chain.
    pub fn filters_delegate(&self) -> FilterDelegate<K::Context> {
        if !self.rebuilding.load(Ordering::Acquire)
            && let Some(delegate) = self.delegate.read().as_ref()
        {
            return Arc::clone(delegate);
        }

        let _guard = self.rebuild.lock();
        if let Some(delegate) = self.delegate.read().as_ref() {
            return Arc::clone(delegate);
        }
        self.build()
    }

    /// Rebuilds the chain from the registry's current contents.
    pub fn filters_definition_changed(&self) {
        let _guard = self.rebuild.lock();
        self.rebuilding.store(true, Ordering::Release);
        self.build();
        self.rebuilding.store(false, Ordering::Release);
    }

    /// How many times the chain has been built.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Must be called with the rebuild lock held.
    fn build(&self) -> FilterDelegate<K::Context> {
        let snapshot = self.registry.snapshot();
        let mut links: Vec<_> = snapshot
            .iter()
            .filter_map(|d| d.link::<K>().map(|link| (d.order(), link)))
            .collect();
        links.sort_by_key(|(order, _)| *order);

        let count = links.len();
        let mut chain: FilterDelegate<K::Context> =
            Arc::new(|_ctx: Arc<K::Context>| futures::future::ok::<(), BoxError>(()).boxed());
        for (_, link) in links.into_iter().rev() {
            let next = Next::new(chain);
            chain = Arc::new(move |ctx: Arc<K::Context>| link(ctx, next.clone()));
        }

        *self.delegate.write() = Some(Arc::clone(&chain));
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(kind = K::NAME, filters = count, "Filter chain built");
        chain
    }
}

impl<K: FilterKind> FilterSubscriber for FilterChainFactory<K> {
    fn filters_changed(&self, change: &FilterChange) {
        if change.affects::<K>() {
            self.filters_definition_changed();
        }
    }
}

impl<K: FilterKind> fmt::Debug for FilterChainFactory<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChainFactory")
            .field("kind", &K::NAME)
            .field("built", &self.delegate.read().is_some())
            .field("builds", &self.build_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ExceptionFilters, Filter, FilterDescriptor, ResultFilters};
    use async_trait::async_trait;
    use sigil_core::{RequestContext, ServiceCollection};

    /// Appends its tag to a shared log, then continues.
    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Filter<ResultFilters> for Tag {
        async fn call(
            &self,
            ctx: Arc<RequestContext>,
            next: Next<RequestContext>,
        ) -> Result<(), BoxError> {
            self.1.lock().push(self.0);
            next.run(ctx).await
        }
    }

    /// Ends the chain.
    struct Stop;

    #[async_trait]
    impl Filter<ResultFilters> for Stop {
        async fn call(&self, _: Arc<RequestContext>, _: Next<RequestContext>) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn ctx() -> Arc<RequestContext> {
        Arc::new(RequestContext::new("x", ServiceCollection::new().build()))
    }

    fn tag(name: &'static str, order: i32, log: &Arc<Mutex<Vec<&'static str>>>) -> FilterDescriptor {
        FilterDescriptor::instance(Tag(name, Arc::clone(log)))
            .order(order)
            .serves::<ResultFilters>()
            .build()
            .unwrap()
    }

    #[test]
    fn test_chain_runs_in_order() {
        let registry = Arc::new(FilterRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(tag("b", 5, &log));
        registry.add(tag("a", -1, &log));
        registry.add(tag("c", 5, &log));

        let factory = FilterChainFactory::<ResultFilters>::new(Arc::clone(&registry));
        tokio_test::block_on(factory.filters_delegate()(ctx())).unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_filter_can_short_circuit() {
        let registry = Arc::new(FilterRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(
            FilterDescriptor::instance(Stop)
                .serves::<ResultFilters>()
                .build()
                .unwrap(),
        );
        registry.add(tag("never", 1, &log));

        let factory = FilterChainFactory::<ResultFilters>::new(registry);
        factory.filters_delegate()(ctx()).await.unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_rebuilds_only_affected_kind() {
        let registry = Arc::new(FilterRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let results = FilterChainFactory::<ResultFilters>::new(Arc::clone(&registry));
        let exceptions = FilterChainFactory::<ExceptionFilters>::new(Arc::clone(&registry));
        results.filters_delegate();
        exceptions.filters_delegate();
        assert_eq!(results.build_count(), 1);
        assert_eq!(exceptions.build_count(), 1);

        registry.add(tag("a", 0, &log));
        assert_eq!(results.build_count(), 2);
        assert_eq!(exceptions.build_count(), 1);

        registry.clear();
        assert_eq!(results.build_count(), 3);
        assert_eq!(exceptions.build_count(), 2);
    }

    #[test]
    fn test_lazy_build() {
        let registry = Arc::new(FilterRegistry::new());
        let factory = FilterChainFactory::<ResultFilters>::new(registry);
        assert_eq!(factory.build_count(), 0);
        factory.filters_delegate();
        factory.filters_delegate();
        assert_eq!(factory.build_count(), 1);
    }

    /// Appends its tag to the request's own state, then continues.
    struct StateTag(&'static str);

    #[async_trait]
    impl Filter<ResultFilters> for StateTag {
        async fn call(
            &self,
            ctx: Arc<RequestContext>,
            next: Next<RequestContext>,
        ) -> Result<(), BoxError> {
            let mut tags = ctx.take_state::<Vec<&'static str>>().unwrap_or_default();
            tags.push(self.0);
            ctx.set_state(tags);
            next.run(ctx).await
        }
    }

    fn state_tags(names: &[&'static str]) -> Vec<FilterDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                FilterDescriptor::instance(StateTag(*name))
                    .order(i as i32)
                    .serves::<ResultFilters>()
                    .build()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_concurrent_rebuilds_publish_whole_chains() {
        let registry = Arc::new(FilterRegistry::new());
        let small = state_tags(&["a", "b"]);
        let large = state_tags(&["a", "b", "c", "d"]);
        registry.mutate(|list| *list = small.clone());
        let factory = FilterChainFactory::<ResultFilters>::new(Arc::clone(&registry));
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..200 {
                    let next = if i % 2 == 0 { large.clone() } else { small.clone() };
                    registry.mutate(|list| *list = next);
                }
                done.store(true, Ordering::Release);
            });
            for _ in 0..2 {
                s.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        factory.filters_definition_changed();
                    }
                });
            }
            for _ in 0..4 {
                s.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        let ctx = ctx();
                        tokio_test::block_on(factory.filters_delegate()(Arc::clone(&ctx))).unwrap();
                        let seen = ctx.take_state::<Vec<&'static str>>().unwrap_or_default();
                        assert!(
                            seen == ["a", "b"] || seen == ["a", "b", "c", "d"],
                            "chain mixed two filter sets: {seen:?}"
                        );
                    }
                });
            }
        });

        assert!(factory.build_count() > 200);
    }
}
