//! The observable list of registered filters.

use std::any::TypeId;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::descriptor::FilterDescriptor;
use super::kind::FilterKind;
use crate::error::{FilterError, FilterResult};

/// A change to the filter list, computed by [`FilterRegistry::mutate`].
#[derive(Debug, Clone)]
pub enum FilterChange {
    Added(Vec<FilterDescriptor>),
    Removed(Vec<FilterDescriptor>),
    Replaced {
        removed: Vec<FilterDescriptor>,
        added: Vec<FilterDescriptor>,
    },
    /// The list was emptied or reordered; every chain must be rebuilt.
    Reset,
}

impl FilterChange {
    /// Returns `true` if chains of kind `K` must be rebuilt.
    pub fn affects<K: FilterKind>(&self) -> bool {
        self.affects_kind(TypeId::of::<K>())
    }

    pub(crate) fn affects_kind(&self, kind: TypeId) -> bool {
        let any = |list: &[FilterDescriptor]| list.iter().any(|d| d.serves_kind(kind));
        match self {
            Self::Added(list) | Self::Removed(list) => any(list),
            Self::Replaced { removed, added } => any(removed) || any(added),
            Self::Reset => true,
        }
    }

    fn diff(old: &[FilterDescriptor], new: &[FilterDescriptor]) -> Option<Self> {
        if new.is_empty() {
            return (!old.is_empty()).then_some(Self::Reset);
        }

        let removed: Vec<_> = old
            .iter()
            .filter(|o| !new.iter().any(|n| n.id() == o.id()))
            .cloned()
            .collect();
        let added: Vec<_> = new
            .iter()
            .filter(|n| !old.iter().any(|o| o.id() == n.id()))
            .cloned()
            .collect();

        match (removed.is_empty(), added.is_empty()) {
            (true, true) => {
                let same_order = old.iter().map(|d| d.id()).eq(new.iter().map(|d| d.id()));
                (!same_order).then_some(Self::Reset)
            }
            (true, false) => Some(Self::Added(added)),
            (false, true) => Some(Self::Removed(removed)),
            (false, false) => Some(Self::Replaced { removed, added }),
        }
    }
}

/// Receives filter list changes.
pub trait FilterSubscriber: Send + Sync {
    fn filters_changed(&self, change: &FilterChange);
}

/// The shared, mutable list of registered filters.
///
/// Readers take cheap snapshots. Writers go through [`mutate`](Self::mutate),
/// which publishes the new list and then tells every live subscriber what
/// changed.
#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<Arc<Vec<FilterDescriptor>>>,
    subscribers: Mutex<Vec<Weak<dyn FilterSubscriber>>>,
    write: Mutex<()>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current filter list.
    pub fn snapshot(&self) -> Arc<Vec<FilterDescriptor>> {
        Arc::clone(&self.filters.read())
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Registers a subscriber. Dropped subscribers are pruned lazily.
    pub fn subscribe(&self, subscriber: Weak<dyn FilterSubscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    /// Edits the filter list in place and notifies subscribers of the
    /// resulting change, if any.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Vec<FilterDescriptor>) -> R) -> R {
        let _guard = self.write.lock();
        let old = self.snapshot();
        let mut new = old.as_ref().clone();
        let out = f(&mut new);

        let Some(change) = FilterChange::diff(&old, &new) else {
            return out;
        };
        *self.filters.write() = Arc::new(new);
        debug!(?change, "Filter list changed");
        self.notify(&change);
        out
    }

    pub fn add(&self, filter: FilterDescriptor) {
        self.mutate(|list| list.push(filter));
    }

    /// Removes the filter with `id`.
    pub fn remove(&self, id: u64) -> FilterResult<FilterDescriptor> {
        self.mutate(|list| {
            let pos = list
                .iter()
                .position(|d| d.id() == id)
                .ok_or(FilterError::UnknownFilter(id))?;
            Ok(list.remove(pos))
        })
    }

    /// Replaces the filter with `id` by `filter`, keeping its position.
    pub fn replace(&self, id: u64, filter: FilterDescriptor) -> FilterResult<FilterDescriptor> {
        self.mutate(|list| {
            let slot = list
                .iter_mut()
                .find(|d| d.id() == id)
                .ok_or(FilterError::UnknownFilter(id))?;
            Ok(std::mem::replace(slot, filter))
        })
    }

    pub fn clear(&self) {
        self.mutate(Vec::clear);
    }

    fn notify(&self, change: &FilterChange) {
        let live: Vec<Arc<dyn FilterSubscriber>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|s| s.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for subscriber in live {
            subscriber.filters_changed(change);
        }
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ExceptionFilters, Filter, Next, ResultFilters};
    use async_trait::async_trait;
    use sigil_core::{BoxError, RequestContext};

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

    fn pass() -> FilterDescriptor {
        FilterDescriptor::instance(Pass)
            .serves::<ResultFilters>()
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<FilterChange>>);

    impl FilterSubscriber for Recorder {
        fn filters_changed(&self, change: &FilterChange) {
            self.0.lock().push(change.clone());
        }
    }

    fn recorded(registry: &FilterRegistry) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn FilterSubscriber> = Arc::downgrade(&recorder) as _;
        registry.subscribe(weak);
        recorder
    }

    #[test]
    fn test_diff_kinds() {
        let registry = FilterRegistry::new();
        let recorder = recorded(&registry);

        let a = pass();
        let b = pass();
        registry.add(a.clone());
        registry.replace(a.id(), b.clone()).unwrap();
        registry.remove(b.id()).unwrap();
        registry.add(pass());
        registry.clear();

        let changes = recorder.0.lock();
        assert!(matches!(changes[0], FilterChange::Added(_)));
        assert!(matches!(changes[1], FilterChange::Replaced { .. }));
        assert!(matches!(changes[2], FilterChange::Removed(_)));
        assert!(matches!(changes[3], FilterChange::Added(_)));
        assert!(matches!(changes[4], FilterChange::Reset));
        assert_eq!(changes.len(), 5);
    }

    #[test]
    fn test_no_change_is_silent() {
        let registry = FilterRegistry::new();
        let recorder = recorded(&registry);
        registry.clear();
        registry.mutate(|_| ());
        assert!(recorder.0.lock().is_empty());
    }

    #[test]
    fn test_reorder_resets() {
        let registry = FilterRegistry::new();
        registry.add(pass());
        registry.add(pass());
        let recorder = recorded(&registry);
        registry.mutate(|list| list.reverse());
        assert!(matches!(recorder.0.lock()[0], FilterChange::Reset));
    }

    #[test]
    fn test_unknown_id() {
        let registry = FilterRegistry::new();
        assert!(matches!(registry.remove(42), Err(FilterError::UnknownFilter(42))));
    }

    #[test]
    fn test_affects_kind() {
        let change = FilterChange::Added(vec![pass()]);
        assert!(change.affects::<ResultFilters>());
        assert!(!change.affects::<ExceptionFilters>());
        assert!(FilterChange::Reset.affects::<ExceptionFilters>());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let registry = FilterRegistry::new();
        drop(recorded(&registry));
        registry.add(pass());
        assert!(registry.subscribers.lock().is_empty());
    }
}
