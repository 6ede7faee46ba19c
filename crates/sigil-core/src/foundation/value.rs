//! Type-erased values passed between parsers, handlers and results.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

type DebugFn = fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result;

fn debug_as<T: fmt::Debug + 'static>(
    value: &(dyn Any + Send + Sync),
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(v) => fmt::Debug::fmt(v, f),
        None => f.write_str("<unknown>"),
    }
}

/// A cheaply clonable, type-erased value.
///
/// Parsed arguments, parameter defaults and success payloads are all carried
/// as `AnyValue`. The concrete type's `Debug` implementation is captured at
/// construction so that values stay printable after erasure.
#[derive(Clone)]
pub struct AnyValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    debug: DebugFn,
}

impl AnyValue {
    /// Wraps a concrete value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        Self {
            inner: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            debug: debug_as::<T>,
        }
    }

    /// Returns a reference to the inner value if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns `true` if the inner value is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Returns a shared handle to the inner value if it is of type `T`.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// The [`TypeId`] of the wrapped value.
    pub fn value_type_id(&self) -> TypeId {
        self.type_id
    }

    /// The type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(self.inner.as_ref(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let value = AnyValue::new(5_i64);
        assert_eq!(value.downcast_ref::<i64>(), Some(&5));
        assert!(value.downcast_ref::<i32>().is_none());
        assert!(value.is::<i64>());
        assert_eq!(value.value_type_id(), TypeId::of::<i64>());
        assert_eq!(value.type_name(), "i64");
    }

    #[test]
    fn test_debug_survives_erasure() {
        let value = AnyValue::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(format!("{value:?}"), r#"["a", "b"]"#);
    }

    #[test]
    fn test_clone_shares_inner() {
        let value = AnyValue::new(String::from("shared"));
        let copy = value.clone();
        let a = value.downcast_arc::<String>().unwrap();
        let b = copy.downcast_arc::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
