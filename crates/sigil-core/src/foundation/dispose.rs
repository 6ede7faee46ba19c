//! End-of-request resource release.
//!
//! Anything the pipeline constructs for a single request (activated module
//! instances, per-request parsers, user resources) is registered with the
//! request's [`DisposalRegistry`]. One sweep at the end of the request
//! releases everything in reverse registration order.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

/// A resource released synchronously.
pub trait Disposable: Send + Sync {
    /// Releases the resource.
    fn dispose(&self);
}

/// A resource released asynchronously.
#[async_trait]
pub trait AsyncDisposable: Send + Sync {
    /// Releases the resource.
    async fn dispose_async(&self);
}

/// Closure adapter produced by [`on_dispose`].
pub struct DisposeFn<F>(Mutex<Option<F>>);

impl<F> Disposable for DisposeFn<F>
where
    F: FnOnce() + Send,
{
    fn dispose(&self) {
        if let Some(f) = self.0.lock().take() {
            f();
        }
    }
}

/// Wraps a closure so it runs when the registry is swept.
pub fn on_dispose<F>(f: F) -> DisposeFn<F>
where
    F: FnOnce() + Send,
{
    DisposeFn(Mutex::new(Some(f)))
}

enum Entry {
    Sync(Box<dyn Disposable>),
    Async(Box<dyn AsyncDisposable>),
}

/// Collects disposables for one request.
#[derive(Default)]
pub struct DisposalRegistry {
    entries: Mutex<Vec<Entry>>,
    disposed: AtomicBool,
}

impl DisposalRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a synchronously released resource.
    ///
    /// Registering after the sweep releases the resource immediately.
    pub fn register(&self, item: Box<dyn Disposable>) {
        if self.is_disposed() {
            item.dispose();
            return;
        }
        self.entries.lock().push(Entry::Sync(item));
    }

    /// Registers an asynchronously released resource.
    ///
    /// Returns the item back if the registry has already been swept, so the
    /// caller can release it itself.
    pub fn register_async(
        &self,
        item: Box<dyn AsyncDisposable>,
    ) -> Result<(), Box<dyn AsyncDisposable>> {
        if self.is_disposed() {
            return Err(item);
        }
        self.entries.lock().push(Entry::Async(item));
        Ok(())
    }

    /// Number of resources waiting for release.
    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` once [`dispose_all`](Self::dispose_all) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Releases every registered resource, newest first.
    ///
    /// Only the first call does any work; later calls return `0`.
    pub async fn dispose_all(&self) -> usize {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let entries = std::mem::take(&mut *self.entries.lock());
        let count = entries.len();
        for entry in entries.into_iter().rev() {
            match entry {
                Entry::Sync(item) => item.dispose(),
                Entry::Async(item) => item.dispose_async().await,
            }
        }
        trace!(count, "Disposed request resources");
        count
    }
}

impl std::fmt::Debug for DisposalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalRegistry")
            .field("pending", &self.pending())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Disposable for Recorder {
        fn dispose(&self) {
            self.log.lock().push(self.name);
        }
    }

    #[async_trait]
    impl AsyncDisposable for Recorder {
        async fn dispose_async(&self) {
            self.log.lock().push(self.name);
        }
    }

    #[tokio::test]
    async fn test_dispose_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = DisposalRegistry::new();
        registry.register(Box::new(Recorder {
            log: Arc::clone(&log),
            name: "first",
        }));
        assert!(
            registry
                .register_async(Box::new(Recorder {
                    log: Arc::clone(&log),
                    name: "second",
                }))
                .is_ok()
        );

        assert_eq!(registry.dispose_all().await, 2);
        assert_eq!(*log.lock(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let registry = DisposalRegistry::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        registry.register(Box::new(on_dispose(move || *counter.lock() += 1)));

        registry.dispose_all().await;
        registry.dispose_all().await;
        assert_eq!(*hits.lock(), 1);
        assert!(registry.is_disposed());
    }

    #[tokio::test]
    async fn test_register_after_dispose_releases_immediately() {
        let registry = DisposalRegistry::new();
        registry.dispose_all().await;

        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        registry.register(Box::new(on_dispose(move || *counter.lock() += 1)));
        assert_eq!(*hits.lock(), 1);
        assert_eq!(registry.pending(), 0);
    }
}
