//! Maps filter kinds to the factories serving them.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use sigil_core::{DispatchError, DispatchResult};

use super::descriptor::FilterDescriptor;
use super::factory::FilterChainFactory;
use super::kind::{ExceptionFilters, FilterDelegate, FilterKind, ResultFilters};
use super::registry::{FilterChange, FilterRegistry, FilterSubscriber};
use crate::error::FilterResult;

type DelegateSource<C> = Arc<dyn Fn() -> FilterDelegate<C> + Send + Sync>;

struct FactoryEntry {
    kind: &'static str,
    context: &'static str,
    /// A `DelegateSource<K::Context>` for the served kind.
    source: Arc<dyn Any + Send + Sync>,
    /// The `Arc<FilterChainFactory<K>>` itself.
    factory: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct DispatchCache(RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>);

impl FilterSubscriber for DispatchCache {
    fn filters_changed(&self, _change: &FilterChange) {
        self.0.write().clear();
    }
}

/// Resolves the filter chain to run for a filter kind.
///
/// Every kind is served by its own [`FilterChainFactory`] unless it is
/// routed to another kind's factory with [`route`](Self::route). Routing only
/// works between kinds sharing a context type; anything else is reported as a
/// shape mismatch when dispatched.
pub struct FilterProvider {
    registry: Arc<FilterRegistry>,
    factories: RwLock<HashMap<TypeId, Arc<FactoryEntry>>>,
    routes: RwLock<HashMap<TypeId, TypeId>>,
    cache: Arc<DispatchCache>,
}

impl FilterProvider {
    /// Creates a provider without any factory.
    pub fn new(registry: Arc<FilterRegistry>) -> Self {
        let cache = Arc::new(DispatchCache::default());
        let weak = Arc::downgrade(&cache);
        registry.subscribe(weak);
        Self {
            registry,
            factories: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            cache,
        }
    }

    /// Creates a provider serving [`ResultFilters`] and [`ExceptionFilters`].
    pub fn with_defaults(registry: Arc<FilterRegistry>) -> Self {
        let provider = Self::new(registry);
        provider.register::<ResultFilters>();
        provider.register::<ExceptionFilters>();
        provider
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Adds a filter to the registry.
    pub fn add(&self, filter: FilterDescriptor) -> u64 {
        let id = filter.id();
        self.registry.add(filter);
        id
    }

    /// Removes a filter from the registry.
    pub fn remove(&self, id: u64) -> FilterResult<FilterDescriptor> {
        self.registry.remove(id)
    }

    /// Creates the factory for `K`, replacing any previous one.
    pub fn register<K: FilterKind>(&self) -> Arc<FilterChainFactory<K>> {
        let factory = FilterChainFactory::<K>::new(Arc::clone(&self.registry));
        let source: DelegateSource<K::Context> = {
            let factory = Arc::clone(&factory);
            Arc::new(move || factory.filters_delegate())
        };
        let entry = FactoryEntry {
            kind: K::NAME,
            context: type_name::<K::Context>(),
            source: Arc::new(source),
            factory: Arc::clone(&factory) as Arc<dyn Any + Send + Sync>,
        };
        self.factories.write().insert(TypeId::of::<K>(), Arc::new(entry));
        self.invalidate();
        debug!(kind = K::NAME, "Filter chain factory registered");
        factory
    }

    /// Serves requests for `Requested` with the factory of `Served`.
    pub fn route<Requested: FilterKind, Served: FilterKind>(&self) {
        self.routes
            .write()
            .insert(TypeId::of::<Requested>(), TypeId::of::<Served>());
        self.invalidate();
    }

    /// The factory registered for `K`.
    pub fn factory<K: FilterKind>(&self) -> Option<Arc<FilterChainFactory<K>>> {
        self.factories
            .read()
            .get(&TypeId::of::<K>())
            .and_then(|e| Arc::clone(&e.factory).downcast::<FilterChainFactory<K>>().ok())
    }

    /// The chain to run for filter kind `K`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::FilterKindNotServed`] if no factory serves `K`.
    /// - [`DispatchError::FilterShapeMismatch`] if the serving factory runs
    ///   against a different context type.
    pub fn dispatch<K: FilterKind>(&self) -> DispatchResult<FilterDelegate<K::Context>> {
        let kind = TypeId::of::<K>();
        if let Some(cached) = self
            .cache
            .0
            .read()
            .get(&kind)
            .and_then(|d| d.downcast_ref::<FilterDelegate<K::Context>>())
        {
            return Ok(Arc::clone(cached));
        }

        let served = self.routes.read().get(&kind).copied().unwrap_or(kind);
        let entry = self
            .factories
            .read()
            .get(&served)
            .cloned()
            .ok_or(DispatchError::FilterKindNotServed(K::NAME))?;
        let source = entry
            .source
            .downcast_ref::<DelegateSource<K::Context>>()
            .cloned()
            .ok_or(DispatchError::FilterShapeMismatch {
                kind: K::NAME,
                expected: type_name::<K::Context>(),
            })?;

        debug!(kind = K::NAME, served_by = entry.kind, "Filter dispatch resolved");
        let dispatch: FilterDelegate<K::Context> = Arc::new(move |ctx: Arc<K::Context>| source()(ctx));
        self.cache.0.write().insert(kind, Arc::new(Arc::clone(&dispatch)));
        Ok(dispatch)
    }

    fn invalidate(&self) {
        self.cache.0.write().clear();
    }
}

impl fmt::Debug for FilterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories: Vec<_> = self
            .factories
            .read()
            .values()
            .map(|e| (e.kind, e.context))
            .collect();
        f.debug_struct("FilterProvider")
            .field("factories", &factories)
            .field("filters", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterContext, Next};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sigil_core::{BoxError, RequestContext, ServiceCollection, ServiceProvider};

    struct Count(Arc<Mutex<u32>>);

    #[async_trait]
    impl Filter<ResultFilters> for Count {
        async fn call(
            &self,
            ctx: Arc<RequestContext>,
            next: Next<RequestContext>,
        ) -> Result<(), BoxError> {
            *self.0.lock() += 1;
            next.run(ctx).await
        }
    }

    /// A kind with a context type of its own.
    enum AuditFilters {}

    struct AuditContext(Arc<dyn ServiceProvider>);

    impl FilterContext for AuditContext {
        fn services(&self) -> &Arc<dyn ServiceProvider> {
            &self.0
        }
    }

    impl FilterKind for AuditFilters {
        type Context = AuditContext;
        const NAME: &'static str = "audit";
    }

    /// Shares the result filters' context type.
    enum LateFilters {}

    impl FilterKind for LateFilters {
        type Context = RequestContext;
        const NAME: &'static str = "late";
    }

    fn ctx() -> Arc<RequestContext> {
        Arc::new(RequestContext::new("x", ServiceCollection::new().build()))
    }

    #[tokio::test]
    async fn test_dispatch_runs_current_chain() {
        let provider = FilterProvider::with_defaults(Arc::new(FilterRegistry::new()));
        let hits = Arc::new(Mutex::new(0));
        let dispatch = provider.dispatch::<ResultFilters>().unwrap();

        dispatch(ctx()).await.unwrap();
        assert_eq!(*hits.lock(), 0);

        provider.add(
            FilterDescriptor::instance(Count(Arc::clone(&hits)))
                .serves::<ResultFilters>()
                .build()
                .unwrap(),
        );
        dispatch(ctx()).await.unwrap();
        provider.dispatch::<ResultFilters>().unwrap()(ctx()).await.unwrap();
        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn test_kind_not_served() {
        let provider = FilterProvider::new(Arc::new(FilterRegistry::new()));
        assert!(matches!(
            provider.dispatch::<ResultFilters>(),
            Err(DispatchError::FilterKindNotServed("result"))
        ));
    }

    #[test]
    fn test_route_checks_context_shape() {
        let provider = FilterProvider::with_defaults(Arc::new(FilterRegistry::new()));

        provider.route::<AuditFilters, ResultFilters>();
        assert!(matches!(
            provider.dispatch::<AuditFilters>(),
            Err(DispatchError::FilterShapeMismatch { kind: "audit", .. })
        ));

        provider.route::<LateFilters, ResultFilters>();
        assert!(provider.dispatch::<LateFilters>().is_ok());
    }

    #[test]
    fn test_factory_lookup() {
        let provider = FilterProvider::with_defaults(Arc::new(FilterRegistry::new()));
        assert!(provider.factory::<ResultFilters>().is_some());
        assert!(provider.factory::<AuditFilters>().is_none());
    }
}
