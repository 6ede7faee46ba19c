//! Argument parser stage.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::{debug, trace};

use sigil_core::{
    ArgumentParser, CommandResult, DispatchConfig, MatchFailure, ParseOutcome, RequestContext,
};

use super::state::{Candidate, candidates, settle};

/// Parses every candidate's remaining input into typed arguments.
///
/// The parser is the command's override, else the nearest module's, else the
/// dispatcher's default. When several candidates parse and
/// [`DispatchConfig::continue_after_parse`] is off, the highest priority one
/// is committed right away.
#[derive(Clone)]
pub struct ArgumentParserLayer {
    config: Arc<DispatchConfig>,
    parser: Arc<dyn ArgumentParser>,
}

impl ArgumentParserLayer {
    pub fn new(config: Arc<DispatchConfig>, parser: Arc<dyn ArgumentParser>) -> Self {
        Self { config, parser }
    }
}

impl<S> Layer<S> for ArgumentParserLayer {
    type Service = ArgumentParserService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ArgumentParserService {
            config: Arc::clone(&self.config),
            parser: Arc::clone(&self.parser),
            inner,
        }
    }
}

pub struct ArgumentParserService<S> {
    config: Arc<DispatchConfig>,
    parser: Arc<dyn ArgumentParser>,
    inner: S,
}

impl<S: Clone> Clone for ArgumentParserService<S> {
    fn clone(&self) -> Self {
        ArgumentParserService {
            config: Arc::clone(&self.config),
            parser: Arc::clone(&self.parser),
            inner: self.inner.clone(),
        }
    }
}

impl<S> Service<Arc<RequestContext>> for ArgumentParserService<S>
where
    S: Service<Arc<RequestContext>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<RequestContext>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let default_parser = Arc::clone(&self.parser);
        let mut inner = self.inner.clone();

        async move {
            if ctx.has_result() {
                return inner.call(ctx).await;
            }

            let all = candidates(&ctx, "argument parser")?;
            let total = all.len();
            let mut survivors: Vec<Candidate> = Vec::new();
            let mut failures = Vec::new();
            for mut candidate in all {
                let command = Arc::clone(candidate.matched.command());
                let parser = match command.parser_override() {
                    Some(parser) => parser.resolve(ctx.services().as_ref())?,
                    None => Arc::clone(&default_parser),
                };

                match parser
                    .parse(&ctx, &command, candidate.matched.remaining())
                    .await
                {
                    ParseOutcome::Parsed(arguments) => {
                        trace!(command = command.name(), "Arguments parsed");
                        candidate.arguments = Some(arguments);
                        survivors.push(candidate);
                    }
                    ParseOutcome::Failed { parameter, reason } => {
                        debug!(command = command.name(), %reason, "Argument parsing failed");
                        failures.push(MatchFailure {
                            command: Arc::clone(&command),
                            result: CommandResult::ParseFailed {
                                command,
                                parameter,
                                reason,
                            },
                        });
                    }
                }
            }

            if survivors.len() > 1 && !config.continue_after_parse {
                survivors = highest_priority(survivors).into_iter().collect();
            }
            settle(&ctx, "argument parser", total, survivors, failures);
            inner.call(ctx).await
        }
        .boxed()
    }
}

/// The candidate with the highest command priority; the first one wins ties.
pub(crate) fn highest_priority(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().reduce(|best, c| {
        if c.matched.command().priority() > best.matched.command().priority() {
            c
        } else {
            best
        }
    })
}
