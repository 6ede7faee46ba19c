//! Request state shared between pipeline stages.

use futures::channel::oneshot;
use tracing::debug;

use sigil_core::{
    Arguments, CommandMatch, CommandResult, DispatchError, DispatchResult, MatchFailure,
    RequestContext,
};

/// A command still in the running for this request.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub matched: CommandMatch,
    /// Set once the argument parser stage succeeded for this candidate.
    pub arguments: Option<Arguments>,
}

impl Candidate {
    pub fn new(matched: CommandMatch) -> Self {
        Self {
            matched,
            arguments: None,
        }
    }
}

/// The candidates stashed in the request's state between stages.
#[derive(Debug, Clone, Default)]
pub struct Candidates(pub Vec<Candidate>);

/// Present while a concurrent command owns the request's disposal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeferredDispose;

/// Holds a detached command back until the dispatcher has read the
/// request's result.
pub(crate) struct LaunchGate(pub(crate) oneshot::Sender<()>);

/// The result as it stood when the pipeline returned.
#[derive(Debug, Clone)]
pub(crate) struct Settled(pub(crate) Option<CommandResult>);

/// The candidates the current stage works on.
///
/// A command committed by an earlier stage without candidates (for example
/// by a custom layer) becomes a single candidate whose remaining input is
/// the raw input after its alias.
pub(crate) fn candidates(ctx: &RequestContext, stage: &'static str) -> DispatchResult<Vec<Candidate>> {
    if let Some(Candidates(list)) = ctx.get_state::<Candidates>() {
        return Ok(list);
    }
    let command = ctx.command().ok_or(DispatchError::MissingState {
        stage,
        missing: "a matched command",
    })?;
    let alias = ctx.alias().unwrap_or_default();
    let remaining = ctx
        .raw_input()
        .strip_prefix(alias.as_str())
        .unwrap_or(ctx.raw_input())
        .trim_start();
    let matched = CommandMatch::new(command, alias.clone(), ctx.raw_input(), remaining);
    Ok(vec![Candidate {
        matched,
        arguments: ctx.arguments(),
    }])
}

/// Stores the surviving candidates, committing the command when exactly one
/// is left.
pub(crate) fn store(ctx: &RequestContext, survivors: Vec<Candidate>) {
    if let [only] = survivors.as_slice() {
        ctx.set_command(
            std::sync::Arc::clone(only.matched.command()),
            only.matched.alias(),
        );
        if let Some(arguments) = &only.arguments {
            ctx.set_arguments(arguments.clone());
        }
    }
    ctx.set_state(Candidates(survivors));
}

/// Applies a stage's verdict.
///
/// With survivors they are stored. Otherwise the request fails with the
/// single candidate's own result, or with every candidate's failure when
/// there were several.
pub(crate) fn settle(
    ctx: &RequestContext,
    stage: &'static str,
    total: usize,
    survivors: Vec<Candidate>,
    mut failures: Vec<MatchFailure>,
) {
    if !survivors.is_empty() {
        debug!(
            stage,
            survivors = survivors.len(),
            rejected = failures.len(),
            "Candidates narrowed"
        );
        store(ctx, survivors);
        return;
    }

    debug!(stage, rejected = failures.len(), "Every candidate was rejected");
    if total == 1 && failures.len() == 1 {
        ctx.set_result(failures.remove(0).result);
    } else {
        ctx.set_result(CommandResult::MatchesFailed { failures });
    }
}
