//! Argument parser contract and per-command overrides.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::Command;
use super::invoker::Arguments;
use super::parameter::Parameter;
use crate::foundation::context::RequestContext;
use crate::foundation::error::{DispatchError, DispatchResult};
use crate::foundation::services::{ServiceArc, ServiceProvider};

/// Outcome of parsing a command's remaining input.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// Every parameter received a value.
    Parsed(Arguments),
    /// Parsing failed.
    Failed {
        /// The parameter that failed, when known.
        parameter: Option<Arc<Parameter>>,
        reason: String,
    },
}

impl ParseOutcome {
    /// A failure not tied to a specific parameter.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            parameter: None,
            reason: reason.into(),
        }
    }

    /// A failure for `parameter`.
    pub fn failed_at(parameter: &Arc<Parameter>, reason: impl Into<String>) -> Self {
        Self::Failed {
            parameter: Some(Arc::clone(parameter)),
            reason: reason.into(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

/// Converts a command's remaining input into typed arguments.
#[async_trait]
pub trait ArgumentParser: Send + Sync {
    async fn parse(&self, ctx: &RequestContext, command: &Command, remaining: &str)
    -> ParseOutcome;
}

type ParserFactory = Arc<dyn Fn() -> Arc<dyn ArgumentParser> + Send + Sync>;
type ParserCast = fn(ServiceArc) -> Option<Arc<dyn ArgumentParser>>;

/// A parser declared on a command or module instead of the dispatcher's
/// default.
///
/// Resolved per request the same way filters are: a shared instance, a fresh
/// instance per request, or an instance owned by the service provider.
#[derive(Clone)]
pub enum ParserOverride {
    /// A shared parser instance.
    Instance(Arc<dyn ArgumentParser>),
    /// Constructed for each request and dropped afterwards.
    Type {
        type_name: &'static str,
        factory: ParserFactory,
    },
    /// Resolved from the request's service scope.
    Service {
        type_id: TypeId,
        type_name: &'static str,
        cast: ParserCast,
    },
}

fn cast_parser<P: ArgumentParser + Any>(svc: ServiceArc) -> Option<Arc<dyn ArgumentParser>> {
    svc.downcast::<P>()
        .ok()
        .map(|p| p as Arc<dyn ArgumentParser>)
}

impl ParserOverride {
    /// Uses one shared parser.
    pub fn instance(parser: impl ArgumentParser + 'static) -> Self {
        Self::Instance(Arc::new(parser))
    }

    /// Creates a `P` per request.
    pub fn of_type<P: ArgumentParser + Default + 'static>() -> Self {
        Self::Type {
            type_name: type_name::<P>(),
            factory: Arc::new(|| Arc::new(P::default()) as Arc<dyn ArgumentParser>),
        }
    }

    /// Resolves a `P` from the request's service scope.
    pub fn service<P: ArgumentParser + Any>() -> Self {
        Self::Service {
            type_id: TypeId::of::<P>(),
            type_name: type_name::<P>(),
            cast: cast_parser::<P>,
        }
    }

    /// Obtains the parser for one request.
    pub fn resolve(&self, services: &dyn ServiceProvider) -> DispatchResult<Arc<dyn ArgumentParser>> {
        match self {
            Self::Instance(parser) => Ok(Arc::clone(parser)),
            Self::Type { factory, .. } => Ok(factory()),
            Self::Service {
                type_id,
                type_name,
                cast,
            } => services
                .resolve(*type_id)
                .and_then(*cast)
                .ok_or(DispatchError::ServiceNotFound(*type_name)),
        }
    }
}

impl fmt::Debug for ParserOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("ParserOverride::Instance"),
            Self::Type { type_name, .. } => write!(f, "ParserOverride::Type({type_name})"),
            Self::Service { type_name, .. } => write!(f, "ParserOverride::Service({type_name})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::services::ServiceCollection;

    #[derive(Default)]
    struct Fixed;

    #[async_trait]
    impl ArgumentParser for Fixed {
        async fn parse(&self, _: &RequestContext, _: &Command, _: &str) -> ParseOutcome {
            ParseOutcome::failed("fixed")
        }
    }

    #[test]
    fn test_resolve_instance_and_type() {
        let services = ServiceCollection::new().build();
        assert!(ParserOverride::instance(Fixed).resolve(services.as_ref()).is_ok());
        assert!(ParserOverride::of_type::<Fixed>().resolve(services.as_ref()).is_ok());
    }

    #[test]
    fn test_resolve_service() {
        let missing = ServiceCollection::new().build();
        assert!(matches!(
            ParserOverride::service::<Fixed>().resolve(missing.as_ref()),
            Err(DispatchError::ServiceNotFound(_))
        ));

        let present = ServiceCollection::new().singleton(Fixed).build();
        assert!(ParserOverride::service::<Fixed>().resolve(present.as_ref()).is_ok());
    }
}
