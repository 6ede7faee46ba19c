//! Authorization and validation checks run before a command executes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::Command;
use super::parameter::Parameter;
use crate::foundation::context::RequestContext;
use crate::foundation::value::AnyValue;

/// Outcome of a single check. `Err` carries the human-readable reason.
pub type PreconditionResult = Result<(), String>;

/// A check attached to a command or module.
///
/// Module preconditions apply to every command the module (transitively)
/// owns.
#[async_trait]
pub trait Precondition: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Decides whether `command` may run for this request.
    async fn check(&self, ctx: &RequestContext, command: &Command) -> PreconditionResult;
}

/// A check attached to a parameter, run against its parsed value.
#[async_trait]
pub trait ParameterPrecondition: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Decides whether `value` is acceptable for `parameter`.
    async fn check(
        &self,
        ctx: &RequestContext,
        parameter: &Parameter,
        value: &AnyValue,
    ) -> PreconditionResult;
}

/// A failed command or module precondition.
#[derive(Clone)]
pub struct PreconditionFailure {
    pub precondition: Arc<dyn Precondition>,
    pub reason: String,
}

impl fmt::Debug for PreconditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreconditionFailure")
            .field("precondition", &self.precondition.name())
            .field("reason", &self.reason)
            .finish()
    }
}

/// A failed parameter precondition.
#[derive(Clone)]
pub struct ParamPreconditionFailure {
    pub precondition: Arc<dyn ParameterPrecondition>,
    pub reason: String,
}

impl fmt::Debug for ParamPreconditionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamPreconditionFailure")
            .field("precondition", &self.precondition.name())
            .field("reason", &self.reason)
            .finish()
    }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Closure-backed [`Precondition`], created by [`precondition`].
pub struct FnPrecondition<F> {
    name: String,
    check: F,
}

#[async_trait]
impl<F> Precondition for FnPrecondition<F>
where
    F: Fn(&RequestContext, &Command) -> PreconditionResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &RequestContext, command: &Command) -> PreconditionResult {
        (self.check)(ctx, command)
    }
}

/// Creates a precondition from a synchronous closure.
///
/// # Example
///
/// ```rust,ignore
/// let admin_only = precondition("admin-only", |ctx, _command| {
///     match ctx.services().get::<Session>() {
///         Some(session) if session.is_admin => Ok(()),
///         _ => Err("administrator access required".into()),
///     }
/// });
/// ```
pub fn precondition<F>(name: impl Into<String>, check: F) -> FnPrecondition<F>
where
    F: Fn(&RequestContext, &Command) -> PreconditionResult + Send + Sync,
{
    FnPrecondition {
        name: name.into(),
        check,
    }
}

/// Closure-backed [`ParameterPrecondition`], created by
/// [`parameter_precondition`].
pub struct FnParameterPrecondition<F> {
    name: String,
    check: F,
}

#[async_trait]
impl<F> ParameterPrecondition for FnParameterPrecondition<F>
where
    F: Fn(&Parameter, &AnyValue) -> PreconditionResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        _ctx: &RequestContext,
        parameter: &Parameter,
        value: &AnyValue,
    ) -> PreconditionResult {
        (self.check)(parameter, value)
    }
}

/// Creates a parameter precondition from a synchronous closure.
pub fn parameter_precondition<F>(name: impl Into<String>, check: F) -> FnParameterPrecondition<F>
where
    F: Fn(&Parameter, &AnyValue) -> PreconditionResult + Send + Sync,
{
    FnParameterPrecondition {
        name: name.into(),
        check,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::services::ServiceCollection;
    use std::sync::Weak;

    #[tokio::test]
    async fn test_parameter_precondition_closure() {
        let positive = parameter_precondition("positive", |_, value| {
            match value.downcast_ref::<i64>() {
                Some(v) if *v > 0 => Ok(()),
                _ => Err("must be positive".to_string()),
            }
        });
        let ctx = RequestContext::new("x", ServiceCollection::new().build());
        let param = Parameter::builder::<i64>("n").finish(0, Weak::new());

        assert_eq!(positive.name(), "positive");
        assert!(positive.check(&ctx, &param, &AnyValue::new(3_i64)).await.is_ok());
        assert_eq!(
            positive.check(&ctx, &param, &AnyValue::new(-1_i64)).await,
            Err("must be positive".to_string())
        );
    }
}
