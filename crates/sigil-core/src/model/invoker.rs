//! Invocation strategies.
//!
//! A handler may return nothing, a [`CommandResult`], or a plain value, and it
//! may do so synchronously or asynchronously. [`Invoker`] fixes the shape once
//! at registration time and exposes one canonical call:
//! `invoke(call) -> BoxFuture<Result<CommandResult, BoxError>>`.
//!
//! | constructor              | handler returns                     | result            |
//! |--------------------------|-------------------------------------|-------------------|
//! | [`Invoker::void`]        | `Result<(), E>`                     | `Success(None)`   |
//! | [`Invoker::result`]      | `Result<CommandResult, E>`          | as returned       |
//! | [`Invoker::object`]      | `Result<T, E>`                      | `Success(Some(T))`|
//! | `*_async`                | a future of the above               | same              |
//!
//! Handler errors are returned as `Err`; the strategy never swallows them.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use super::command::Command;
use super::module::ModuleInstance;
use super::parameter::Parameter;
use crate::foundation::context::RequestContext;
use crate::foundation::error::BoxError;
use crate::foundation::result::CommandResult;
use crate::foundation::value::AnyValue;

// ============================================================================
// Arguments
// ============================================================================

/// Parsed argument values in parameter order.
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<(Arc<Parameter>, AnyValue)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the value of `parameter`.
    pub fn push(&mut self, parameter: Arc<Parameter>, value: AnyValue) {
        self.values.push((parameter, value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(parameter, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Parameter>, &AnyValue)> {
        self.values.iter().map(|(p, v)| (p, v))
    }

    /// The erased value of the parameter named `name`.
    pub fn get_value(&self, name: &str) -> Option<&AnyValue> {
        self.values
            .iter()
            .find(|(p, _)| p.name() == name)
            .map(|(_, v)| v)
    }

    /// The value of the parameter named `name`, if it has type `T`.
    ///
    /// Variadic parameters hold a `Vec<T>`.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.get_value(name).and_then(|v| v.downcast_ref::<T>())
    }

    /// The value at position `index`, if it has type `T`.
    pub fn at<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(|(_, v)| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(p, v)| (p.name(), v)))
            .finish()
    }
}

// ============================================================================
// CommandCall
// ============================================================================

/// Everything a handler receives.
pub struct CommandCall {
    pub context: Arc<RequestContext>,
    pub command: Arc<Command>,
    pub arguments: Arguments,
    pub module: Option<ModuleInstance>,
}

impl CommandCall {
    /// Shorthand for `self.arguments.get::<T>(name)`.
    pub fn arg<T: Any>(&self, name: &str) -> Option<&T> {
        self.arguments.get::<T>(name)
    }

    /// The module instance, if the owning module declares one of type `M`.
    pub fn module<M: Any + Send + Sync>(&self) -> Option<Arc<M>> {
        self.module.as_ref().and_then(|m| m.downcast::<M>())
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

// ============================================================================
// Invoker
// ============================================================================

type SyncHandler = Arc<dyn Fn(CommandCall) -> Result<CommandResult, BoxError> + Send + Sync>;
type AsyncHandler =
    Arc<dyn Fn(CommandCall) -> BoxFuture<'static, Result<CommandResult, BoxError>> + Send + Sync>;

/// What a handler returns, independent of whether it is asynchronous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokerShape {
    Void,
    Result,
    Object,
}

/// A handler adapted to the canonical call shape.
#[derive(Clone)]
pub enum Invoker {
    Void(SyncHandler),
    Result(SyncHandler),
    Object(SyncHandler),
    VoidAsync(AsyncHandler),
    ResultAsync(AsyncHandler),
    ObjectAsync(AsyncHandler),
}

impl Invoker {
    /// Adapts a handler that returns nothing.
    pub fn void<F, E>(handler: F) -> Self
    where
        F: Fn(CommandCall) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::Void(Arc::new(move |call: CommandCall| -> Result<CommandResult, BoxError> {
            handler(call).map_err(Into::<BoxError>::into)?;
            Ok(CommandResult::success())
        }))
    }

    /// Adapts a handler that builds its own [`CommandResult`].
    pub fn result<F, E>(handler: F) -> Self
    where
        F: Fn(CommandCall) -> Result<CommandResult, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::Result(Arc::new(move |call: CommandCall| {
            handler(call).map_err(Into::<BoxError>::into)
        }))
    }

    /// Adapts a handler that returns a plain value.
    pub fn object<F, T, E>(handler: F) -> Self
    where
        F: Fn(CommandCall) -> Result<T, E> + Send + Sync + 'static,
        T: Any + Send + Sync + fmt::Debug,
        E: Into<BoxError>,
    {
        Self::Object(Arc::new(move |call: CommandCall| -> Result<CommandResult, BoxError> {
            let value = handler(call).map_err(Into::<BoxError>::into)?;
            Ok(CommandResult::success_with(value))
        }))
    }

    /// Adapts an asynchronous handler that returns nothing.
    pub fn void_async<F, Fut, E>(handler: F) -> Self
    where
        F: Fn(CommandCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::VoidAsync(Arc::new(move |call: CommandCall| {
            let fut = handler(call);
            async move {
                fut.await.map_err(Into::<BoxError>::into)?;
                Ok::<_, BoxError>(CommandResult::success())
            }
            .boxed()
        }))
    }

    /// Adapts an asynchronous handler that builds its own [`CommandResult`].
    pub fn result_async<F, Fut, E>(handler: F) -> Self
    where
        F: Fn(CommandCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CommandResult, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::ResultAsync(Arc::new(move |call: CommandCall| {
            let fut = handler(call);
            async move { fut.await.map_err(Into::<BoxError>::into) }.boxed()
        }))
    }

    /// Adapts an asynchronous handler that returns a plain value.
    pub fn object_async<F, Fut, T, E>(handler: F) -> Self
    where
        F: Fn(CommandCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Any + Send + Sync + fmt::Debug,
        E: Into<BoxError>,
    {
        Self::ObjectAsync(Arc::new(move |call: CommandCall| {
            let fut = handler(call);
            async move {
                let value = fut.await.map_err(Into::<BoxError>::into)?;
                Ok::<_, BoxError>(CommandResult::success_with(value))
            }
            .boxed()
        }))
    }

    /// Runs the handler.
    ///
    /// Synchronous handlers run before this returns; the returned future is
    /// already complete.
    pub fn invoke(&self, call: CommandCall) -> BoxFuture<'static, Result<CommandResult, BoxError>> {
        match self {
            Self::Void(h) | Self::Result(h) | Self::Object(h) => future::ready(h(call)).boxed(),
            Self::VoidAsync(h) | Self::ResultAsync(h) | Self::ObjectAsync(h) => h(call),
        }
    }

    pub fn shape(&self) -> InvokerShape {
        match self {
            Self::Void(_) | Self::VoidAsync(_) => InvokerShape::Void,
            Self::Result(_) | Self::ResultAsync(_) => InvokerShape::Result,
            Self::Object(_) | Self::ObjectAsync(_) => InvokerShape::Object,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Self::VoidAsync(_) | Self::ResultAsync(_) | Self::ObjectAsync(_)
        )
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("shape", &self.shape())
            .field("async", &self.is_async())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::services::ServiceCollection;
    use crate::model::module::ModuleBuilder;

    fn call_for(invoker: Invoker) -> (Invoker, CommandCall) {
        let module = ModuleBuilder::new("m")
            .alias("m")
            .command(Command::builder("c", invoker.clone()))
            .build()
            .unwrap();
        let command = Arc::clone(&module.commands()[0]);
        let call = CommandCall {
            context: Arc::new(RequestContext::new("m c", ServiceCollection::new().build())),
            command,
            arguments: Arguments::new(),
            module: None,
        };
        (invoker, call)
    }

    #[tokio::test]
    async fn test_void_synthesizes_success() {
        let (invoker, call) = call_for(Invoker::void(|_| Ok::<_, BoxError>(())));
        let result = invoker.invoke(call).await.unwrap();
        assert!(result.is_success());
        assert!(result.value().is_none());
        assert_eq!(invoker.shape(), InvokerShape::Void);
    }

    #[tokio::test]
    async fn test_object_wraps_value() {
        let (invoker, call) = call_for(Invoker::object(|_| Ok::<_, BoxError>(42_i64)));
        let result = invoker.invoke(call).await.unwrap();
        assert_eq!(result.value().unwrap().downcast_ref::<i64>(), Some(&42));
    }

    #[tokio::test]
    async fn test_result_passes_through() {
        let (invoker, call) = call_for(Invoker::result(|call: CommandCall| {
            Ok::<_, BoxError>(CommandResult::BadArgCount {
                command: call.command,
            })
        }));
        let result = invoker.invoke(call).await.unwrap();
        assert!(matches!(result, CommandResult::BadArgCount { .. }));
    }

    #[tokio::test]
    async fn test_async_variants() {
        let (invoker, call) =
            call_for(Invoker::object_async(|_| async { Ok::<_, BoxError>("later") }));
        assert!(invoker.is_async());
        let result = invoker.invoke(call).await.unwrap();
        assert_eq!(
            result.value().unwrap().downcast_ref::<&str>(),
            Some(&"later")
        );
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let (invoker, call) = call_for(Invoker::void_async(|_| async {
            Err::<(), BoxError>("nope".into())
        }));
        let err = invoker.invoke(call).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
