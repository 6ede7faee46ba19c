//! Service resolution.
//!
//! The pipeline only needs two capabilities from a dependency container:
//! resolve an instance by type, and open a per-request scope. Those are
//! captured by [`ServiceProvider`]. [`ServiceCollection`] is a small
//! implementation covering singletons and scoped factories; hosts with their
//! own container implement the trait directly.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{DispatchError, DispatchResult};

/// Type-erased service instance. The inner `dyn Any` is an `Arc<T>` upcast,
/// so it downcasts back to `Arc<T>` with [`Arc::downcast`].
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

/// Resolves services by type and opens request scopes.
pub trait ServiceProvider: Send + Sync {
    /// Returns the instance registered for `type_id`, if any.
    fn resolve(&self, type_id: TypeId) -> Option<ServiceArc>;

    /// Opens a child scope. Scoped services resolved through the child are
    /// cached for the child's lifetime only.
    fn create_scope(&self) -> Arc<dyn ServiceProvider>;
}

impl dyn ServiceProvider {
    /// Resolves a service of concrete type `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resolve(TypeId::of::<T>())
            .and_then(|svc| svc.downcast::<T>().ok())
    }

    /// Resolves a service of concrete type `T` or fails with
    /// [`DispatchError::ServiceNotFound`].
    pub fn require<T: Any + Send + Sync>(&self) -> DispatchResult<Arc<T>> {
        self.get::<T>()
            .ok_or(DispatchError::ServiceNotFound(type_name::<T>()))
    }
}

type ScopedFactory = Arc<dyn Fn(&dyn ServiceProvider) -> ServiceArc + Send + Sync>;

#[derive(Clone)]
enum Registration {
    Singleton(ServiceArc),
    Scoped(ScopedFactory),
}

/// Builder for a simple service container.
///
/// # Example
///
/// ```rust,ignore
/// let services = ServiceCollection::new()
///     .singleton(Database::connect()?)
///     .scoped(|_| UnitOfWork::default())
///     .build();
/// let db = services.get::<Database>();
/// ```
#[derive(Default, Clone)]
pub struct ServiceCollection {
    registrations: HashMap<TypeId, Registration>,
}

impl ServiceCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a singleton value.
    pub fn singleton<T: Any + Send + Sync>(self, value: T) -> Self {
        self.singleton_arc(Arc::new(value))
    }

    /// Registers an already shared singleton.
    pub fn singleton_arc<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Singleton(value));
        self
    }

    /// Registers a factory producing one instance per scope.
    pub fn scoped<T, F>(mut self, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn ServiceProvider) -> T + Send + Sync + 'static,
    {
        let factory: ScopedFactory = Arc::new(move |sp| Arc::new(factory(sp)) as ServiceArc);
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Scoped(factory));
        self
    }

    /// Returns `true` if a service of type `T` is registered.
    pub fn contains<T: Any>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Freezes the collection into a root provider.
    pub fn build(self) -> Arc<dyn ServiceProvider> {
        Arc::new(ServiceContainer {
            registrations: Arc::new(self.registrations),
            scoped: Mutex::new(HashMap::new()),
        })
    }
}

/// Provider produced by [`ServiceCollection::build`].
struct ServiceContainer {
    registrations: Arc<HashMap<TypeId, Registration>>,
    /// Instances of scoped services created within this scope.
    scoped: Mutex<HashMap<TypeId, ServiceArc>>,
}

impl ServiceProvider for ServiceContainer {
    fn resolve(&self, type_id: TypeId) -> Option<ServiceArc> {
        match self.registrations.get(&type_id)? {
            Registration::Singleton(value) => Some(Arc::clone(value)),
            Registration::Scoped(factory) => {
                if let Some(existing) = self.scoped.lock().get(&type_id) {
                    return Some(Arc::clone(existing));
                }
                // The lock is released while the factory runs so that it may
                // resolve other services from this scope.
                let created = factory(self);
                let mut scoped = self.scoped.lock();
                Some(Arc::clone(scoped.entry(type_id).or_insert(created)))
            }
        }
    }

    fn create_scope(&self) -> Arc<dyn ServiceProvider> {
        Arc::new(ServiceContainer {
            registrations: Arc::clone(&self.registrations),
            scoped: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Config {
        name: &'static str,
    }

    struct Session {
        id: usize,
    }

    #[test]
    fn test_singleton_resolution() {
        let services = ServiceCollection::new()
            .singleton(Config { name: "main" })
            .build();

        let a = services.get::<Config>().unwrap();
        let b = services.get::<Config>().unwrap();
        assert_eq!(a.name, "main");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_missing_service() {
        let services = ServiceCollection::new().build();
        assert!(services.get::<Config>().is_none());
        assert!(matches!(
            services.require::<Config>(),
            Err(DispatchError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_scoped_instances_per_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let root = ServiceCollection::new()
            .scoped(move |_| Session {
                id: c.fetch_add(1, Ordering::SeqCst),
            })
            .build();

        let scope_a = root.create_scope();
        let scope_b = root.create_scope();

        let a1 = scope_a.get::<Session>().unwrap();
        let a2 = scope_a.get::<Session>().unwrap();
        let b1 = scope_b.get::<Session>().unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert_ne!(a1.id, b1.id);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
