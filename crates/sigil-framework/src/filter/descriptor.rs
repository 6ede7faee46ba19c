//! Filter registration entries.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;

use super::kind::{Filter, FilterContext, FilterFuture, FilterKind, Next};
use crate::error::{FilterError, FilterResult};

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// How a filter's instance is obtained for each invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterLifetime {
    /// One shared instance, never released by the pipeline.
    Instance,
    /// Constructed per invocation and dropped when the link returns.
    Type,
    /// Resolved from the context's services, owned by the container.
    Service,
}

pub(crate) type Link<K> = Arc<
    dyn Fn(Arc<<K as FilterKind>::Context>, Next<<K as FilterKind>::Context>) -> FilterFuture
        + Send
        + Sync,
>;

/// A registered filter.
///
/// Built with [`FilterDescriptor::instance`], [`FilterDescriptor::of_type`]
/// or [`FilterDescriptor::service`], followed by one
/// [`serves`](FilterDescriptorBuilder::serves) per filter kind the
/// implementation handles.
///
/// ```rust,ignore
/// let audit = FilterDescriptor::instance(Audit::default())
///     .order(-10)
///     .serves::<ResultFilters>()
///     .serves::<ExceptionFilters>()
///     .build()?;
/// ```
#[derive(Clone)]
pub struct FilterDescriptor {
    id: u64,
    order: i32,
    type_id: TypeId,
    type_name: &'static str,
    lifetime: FilterLifetime,
    links: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl FilterDescriptor {
    /// Registers a shared instance.
    pub fn instance<F: Send + Sync + 'static>(filter: F) -> FilterDescriptorBuilder<F> {
        FilterDescriptorBuilder::new(Source::Instance(Arc::new(filter)))
    }

    /// Registers a type constructed with `Default` for every invocation.
    pub fn of_type<F: Default + Send + Sync + 'static>() -> FilterDescriptorBuilder<F> {
        Self::with_factory(F::default)
    }

    /// Registers a type constructed by `factory` for every invocation.
    pub fn with_factory<F, Fac>(factory: Fac) -> FilterDescriptorBuilder<F>
    where
        F: Send + Sync + 'static,
        Fac: Fn() -> F + Send + Sync + 'static,
    {
        FilterDescriptorBuilder::new(Source::Type(Arc::new(factory)))
    }

    /// Registers a type resolved from the context's services.
    pub fn service<F: Send + Sync + 'static>() -> FilterDescriptorBuilder<F> {
        FilterDescriptorBuilder::new(Source::Service)
    }

    /// Unique id assigned at build time.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// The implementation type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn lifetime(&self) -> FilterLifetime {
        self.lifetime
    }

    /// Returns `true` if the filter participates in chains of kind `K`.
    pub fn serves<K: FilterKind>(&self) -> bool {
        self.serves_kind(TypeId::of::<K>())
    }

    pub(crate) fn serves_kind(&self, kind: TypeId) -> bool {
        self.links.contains_key(&kind)
    }

    pub(crate) fn link<K: FilterKind>(&self) -> Option<Link<K>> {
        self.links
            .get(&TypeId::of::<K>())
            .and_then(|link| link.downcast_ref::<Link<K>>())
            .cloned()
    }
}

impl fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("type_name", &self.type_name)
            .field("lifetime", &self.lifetime)
            .field("kinds", &self.links.len())
            .finish()
    }
}

enum Source<F> {
    Instance(Arc<F>),
    Type(Arc<dyn Fn() -> F + Send + Sync>),
    Service,
}

impl<F> Clone for Source<F> {
    fn clone(&self) -> Self {
        match self {
            Self::Instance(f) => Self::Instance(Arc::clone(f)),
            Self::Type(factory) => Self::Type(Arc::clone(factory)),
            Self::Service => Self::Service,
        }
    }
}

/// Builder for [`FilterDescriptor`].
pub struct FilterDescriptorBuilder<F> {
    source: Source<F>,
    order: i32,
    links: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl<F: Send + Sync + 'static> FilterDescriptorBuilder<F> {
    fn new(source: Source<F>) -> Self {
        Self {
            source,
            order: 0,
            links: HashMap::new(),
        }
    }

    /// Position in the chain; lower runs first. Defaults to 0.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Adds filter kind `K` to the kinds this filter serves.
    pub fn serves<K: FilterKind>(mut self) -> Self
    where
        F: Filter<K>,
    {
        let link: Link<K> = match self.source.clone() {
            Source::Instance(filter) => Arc::new(move |ctx: Arc<K::Context>, next: Next<K::Context>| {
                let filter = Arc::clone(&filter);
                async move { <F as Filter<K>>::call(&*filter, ctx, next).await }.boxed()
            }),
            Source::Type(factory) => Arc::new(move |ctx: Arc<K::Context>, next: Next<K::Context>| {
                let filter = factory();
                async move {
                    let result = <F as Filter<K>>::call(&filter, ctx, next).await;
                    drop(filter);
                    result
                }
                .boxed()
            }),
            Source::Service => Arc::new(|ctx: Arc<K::Context>, next: Next<K::Context>| {
                async move {
                    let filter = ctx
                        .services()
                        .get::<F>()
                        .ok_or(FilterError::ServiceMissing(type_name::<F>()))?;
                    <F as Filter<K>>::call(&*filter, ctx, next).await
                }
                .boxed()
            }),
        };
        self.links.insert(TypeId::of::<K>(), Arc::new(link));
        self
    }

    /// Finishes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::NoKinds`] if no kind was added.
    pub fn build(self) -> FilterResult<FilterDescriptor> {
        if self.links.is_empty() {
            return Err(FilterError::NoKinds(type_name::<F>()));
        }
        let lifetime = match self.source {
            Source::Instance(_) => FilterLifetime::Instance,
            Source::Type(_) => FilterLifetime::Type,
            Source::Service => FilterLifetime::Service,
        };
        Ok(FilterDescriptor {
            id: NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed),
            order: self.order,
            type_id: TypeId::of::<F>(),
            type_name: type_name::<F>(),
            lifetime,
            links: Arc::new(self.links),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ExceptionFilters, ResultFilters};
    use async_trait::async_trait;
    use sigil_core::{BoxError, RequestContext};

    #[derive(Default)]
    struct Pass;

    #[async_trait]
    impl Filter<ResultFilters> for Pass {
        async fn call(
            &self,
            ctx: Arc<RequestContext>,
            next: Next<RequestContext>,
        ) -> Result<(), BoxError> {
            next.run(ctx).await
        }
    }

    #[test]
    fn test_build_requires_kind() {
        let err = FilterDescriptor::instance(Pass).build().unwrap_err();
        assert!(matches!(err, FilterError::NoKinds(_)));
    }

    #[test]
    fn test_descriptor_metadata() {
        let d = FilterDescriptor::of_type::<Pass>()
            .order(3)
            .serves::<ResultFilters>()
            .build()
            .unwrap();
        assert_eq!(d.order(), 3);
        assert_eq!(d.lifetime(), FilterLifetime::Type);
        assert_eq!(d.type_id(), TypeId::of::<Pass>());
        assert!(d.serves::<ResultFilters>());
        assert!(!d.serves::<ExceptionFilters>());
        assert!(d.link::<ResultFilters>().is_some());
        assert!(d.link::<ExceptionFilters>().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = FilterDescriptor::instance(Pass).serves::<ResultFilters>().build().unwrap();
        let b = FilterDescriptor::instance(Pass).serves::<ResultFilters>().build().unwrap();
        assert_ne!(a.id(), b.id());
    }
}
