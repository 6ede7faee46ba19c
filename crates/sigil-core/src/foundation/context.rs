//! Per-invocation request context.
//!
//! One [`RequestContext`] is created for every dispatched input and shared as
//! `Arc<RequestContext>` between the pipeline stages. It carries:
//!
//! - the raw input and, once resolved, the command, alias and arguments;
//! - the **result slot**: once a result is set every later stage passes the
//!   request through unchanged;
//! - a typed **state bag** used by stages to hand candidate sets to each
//!   other while more than one command is still in play;
//! - the request's service scope and its [`DisposalRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! let ctx = Arc::new(RequestContext::new("math add 2 3", services.create_scope()));
//! ctx.set_state(MyMarker(42));          // visible to later stages
//! if let Some(result) = ctx.result() {  // short-circuit check
//!     return Ok(());
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::dispose::{AsyncDisposable, Disposable, DisposalRegistry};
use super::error::HandlerFault;
use super::result::CommandResult;
use super::services::ServiceProvider;
use crate::model::{Arguments, Command};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct Resolution {
    command: Option<Arc<Command>>,
    alias: Option<String>,
    arguments: Option<Arguments>,
    result: Option<CommandResult>,
    exception: Option<HandlerFault>,
}

/// Mutable state for a single dispatch.
pub struct RequestContext {
    id: u64,
    raw_input: String,
    services: Arc<dyn ServiceProvider>,
    resolution: Mutex<Resolution>,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    disposal: DisposalRegistry,
}

impl RequestContext {
    /// Creates a context for `raw_input` using the given service scope.
    pub fn new(raw_input: impl Into<String>, services: Arc<dyn ServiceProvider>) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            raw_input: raw_input.into(),
            services,
            resolution: Mutex::new(Resolution::default()),
            state: Mutex::new(HashMap::new()),
            disposal: DisposalRegistry::new(),
        }
    }

    /// Process-unique identifier of this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The input text as received.
    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    /// The service scope of this request.
    pub fn services(&self) -> &Arc<dyn ServiceProvider> {
        &self.services
    }

    // ─── Resolution ───────────────────────────────────────────────────────────

    /// The resolved command, once a single command has been settled.
    pub fn command(&self) -> Option<Arc<Command>> {
        self.resolution.lock().command.clone()
    }

    /// Commits the resolved command and the alias it was matched by.
    pub fn set_command(&self, command: Arc<Command>, alias: impl Into<String>) {
        let mut resolution = self.resolution.lock();
        resolution.command = Some(command);
        resolution.alias = Some(alias.into());
    }

    /// The alias text the resolved command was matched by.
    pub fn alias(&self) -> Option<String> {
        self.resolution.lock().alias.clone()
    }

    /// The parsed arguments of the resolved command.
    pub fn arguments(&self) -> Option<Arguments> {
        self.resolution.lock().arguments.clone()
    }

    /// Stores the parsed arguments of the resolved command.
    pub fn set_arguments(&self, arguments: Arguments) {
        self.resolution.lock().arguments = Some(arguments);
    }

    /// Clears resolved arguments.
    pub fn clear_arguments(&self) {
        self.resolution.lock().arguments = None;
    }

    // ─── Result slot ──────────────────────────────────────────────────────────

    /// Returns a clone of the current result, if one is set.
    pub fn result(&self) -> Option<CommandResult> {
        self.resolution.lock().result.clone()
    }

    /// Returns `true` if a result is set.
    pub fn has_result(&self) -> bool {
        self.resolution.lock().result.is_some()
    }

    /// Sets the result, replacing any previous one.
    pub fn set_result(&self, result: CommandResult) {
        self.resolution.lock().result = Some(result);
    }

    /// Removes and returns the result.
    pub fn take_result(&self) -> Option<CommandResult> {
        self.resolution.lock().result.take()
    }

    // ─── Exception feature ────────────────────────────────────────────────────

    /// The fault captured by the exception stage, if any.
    pub fn exception(&self) -> Option<HandlerFault> {
        self.resolution.lock().exception.clone()
    }

    /// Records the fault captured by the exception stage.
    pub fn set_exception(&self, fault: HandlerFault) {
        self.resolution.lock().exception = Some(fault);
    }

    // ─── State bag ────────────────────────────────────────────────────────────

    /// Stores a value in the state bag. One value per type; later calls
    /// overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a clone of a value from the state bag.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if a value of type `T` is in the state bag.
    pub fn has_state<T: 'static>(&self) -> bool {
        self.state.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns a value from the state bag.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    // ─── Disposal ─────────────────────────────────────────────────────────────

    /// Registers a resource released when the request ends.
    pub fn register_for_dispose(&self, item: Box<dyn Disposable>) {
        self.disposal.register(item);
    }

    /// Registers an asynchronously released resource.
    ///
    /// If the context is already disposed the resource is released before
    /// this call returns.
    pub async fn register_for_dispose_async(&self, item: Box<dyn AsyncDisposable>) {
        if let Err(item) = self.disposal.register_async(item) {
            item.dispose_async().await;
        }
    }

    /// Returns `true` once the context has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposal.is_disposed()
    }

    /// Releases every registered resource. Idempotent.
    pub async fn dispose(&self) {
        self.disposal.dispose_all().await;
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolution = self.resolution.lock();
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("raw_input", &self.raw_input)
            .field("command", &resolution.command.as_ref().map(|c| c.name()))
            .field("alias", &resolution.alias)
            .field("result", &resolution.result.as_ref().map(|r| r.kind()))
            .field("disposal", &self.disposal)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::dispose::on_dispose;
    use crate::foundation::services::ServiceCollection;
    use std::sync::atomic::AtomicBool;

    fn context(input: &str) -> RequestContext {
        RequestContext::new(input, ServiceCollection::new().build())
    }

    #[test]
    fn test_ids_are_unique() {
        let a = context("a");
        let b = context("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.raw_input(), "a");
    }

    #[test]
    fn test_state_bag() {
        #[derive(Clone, Debug, PartialEq)]
        struct Marker(u32);

        let ctx = context("x");
        assert!(!ctx.has_state::<Marker>());
        ctx.set_state(Marker(1));
        ctx.set_state(Marker(2));
        assert_eq!(ctx.get_state::<Marker>(), Some(Marker(2)));
        assert_eq!(ctx.take_state::<Marker>(), Some(Marker(2)));
        assert!(!ctx.has_state::<Marker>());
    }

    #[test]
    fn test_result_slot() {
        let ctx = context("x");
        assert!(!ctx.has_result());
        ctx.set_result(CommandResult::success());
        assert!(ctx.has_result());
        assert!(ctx.take_result().unwrap().is_success());
        assert!(ctx.result().is_none());
    }

    #[tokio::test]
    async fn test_dispose_runs_registered_items() {
        let ctx = context("x");
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        ctx.register_for_dispose(Box::new(on_dispose(move || {
            flag.store(true, Ordering::SeqCst);
        })));

        ctx.dispose().await;
        assert!(released.load(Ordering::SeqCst));
        assert!(ctx.is_disposed());
    }
}
