use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use clap::Parser;
use clap::error::ErrorKind;
use tracing::debug;

use sigil_core::{
    AnyValue, ArgumentParser, Arguments, Command, ParameterBuilder, ParseOutcome, Parameter,
    ParserOverride, RequestContext,
};

use crate::parsing::shell_split;

/// Parses a command's remaining input as the clap type `T`.
///
/// The parsed `T` is bound to the command's parameter of type `T`. Help and
/// version requests end parsing with clap's rendered output as the failure
/// reason, so they surface as [`ParseFailed`](sigil_core::CommandResult::ParseFailed).
pub struct ClapArgumentParser<T> {
    separator: char,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ClapArgumentParser<T>
where
    T: Parser + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a parser splitting on `separator`.
    pub fn new(separator: char) -> Self {
        Self {
            separator,
            _marker: PhantomData,
        }
    }

    /// The parameter receiving the parsed `T`. It accepts any number of
    /// tokens; clap decides what is valid.
    pub fn parameter(name: impl Into<String>) -> ParameterBuilder {
        Parameter::builder::<T>(name).variadic()
    }

    /// A per-request parser override using the default separator.
    pub fn as_override() -> ParserOverride {
        ParserOverride::of_type::<Self>()
    }
}

impl<T> Default for ClapArgumentParser<T>
where
    T: Parser + fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(' ')
    }
}

#[async_trait]
impl<T> ArgumentParser for ClapArgumentParser<T>
where
    T: Parser + fmt::Debug + Send + Sync + 'static,
{
    async fn parse(&self, _ctx: &RequestContext, command: &Command, remaining: &str) -> ParseOutcome {
        let Some(parameter) = command
            .parameters()
            .iter()
            .find(|p| p.type_id() == TypeId::of::<T>())
        else {
            return ParseOutcome::failed(format!(
                "command '{}' declares no parameter of type {}",
                command.name(),
                type_name::<T>()
            ));
        };

        let mut args = vec![command.name().to_string()];
        args.extend(shell_split(remaining, self.separator));

        match T::try_parse_from(&args) {
            Ok(parsed) => {
                let mut arguments = Arguments::new();
                arguments.push(std::sync::Arc::clone(parameter), AnyValue::new(parsed));
                ParseOutcome::Parsed(arguments)
            }
            Err(err) => {
                let kind = err.kind();
                if !matches!(kind, ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                    debug!(command = command.name(), ?kind, "Clap rejected arguments");
                }
                ParseOutcome::failed_at(parameter, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{BoxError, Invoker, ModuleBuilder, ServiceCollection};
    use std::sync::Arc;

    #[derive(Parser, Debug, Clone, PartialEq)]
    struct Echo {
        #[arg(short, long, default_value_t = 1)]
        times: u32,
        text: Vec<String>,
    }

    fn echo() -> Arc<Command> {
        let module = ModuleBuilder::new("m")
            .command(
                Command::builder("echo", Invoker::void(|_| Ok::<_, BoxError>(())))
                    .parameter(ClapArgumentParser::<Echo>::parameter("args")),
            )
            .build()
            .unwrap();
        Arc::clone(&module.commands()[0])
    }

    async fn parse(input: &str) -> ParseOutcome {
        let ctx = RequestContext::new(input, ServiceCollection::new().build());
        ClapArgumentParser::<Echo>::default()
            .parse(&ctx, &echo(), input)
            .await
    }

    #[tokio::test]
    async fn test_parses_clap_type() {
        let ParseOutcome::Parsed(args) = parse("-t 2 \"hello world\" again").await else {
            panic!("expected parsed arguments");
        };
        assert_eq!(
            args.get::<Echo>("args"),
            Some(&Echo {
                times: 2,
                text: vec!["hello world".into(), "again".into()],
            })
        );
    }

    #[tokio::test]
    async fn test_help_is_a_failure() {
        match parse("--help").await {
            ParseOutcome::Failed { reason, .. } => assert!(reason.contains("Usage")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_flag() {
        assert!(!parse("--times nope").await.is_parsed());
    }
}
