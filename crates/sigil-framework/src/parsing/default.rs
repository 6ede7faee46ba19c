//! The dispatcher's default argument parser.

use std::sync::Arc;

use async_trait::async_trait;
use sigil_core::{ArgumentParser, Arguments, Command, ParseOutcome, RequestContext};
use tracing::trace;

use super::split::try_shell_split;
use super::types::TypeParserRegistry;
use crate::error::ParseError;

/// Splits the remaining input shell-style and converts one token per
/// parameter through a [`TypeParserRegistry`].
///
/// - A variadic last parameter receives every remaining token as a `Vec`.
/// - Omitted optional parameters take their default, or are left out of the
///   [`Arguments`] when they have none.
/// - Surplus tokens are left to the input count stage and ignored here.
#[derive(Clone)]
pub struct DefaultArgumentParser {
    parsers: Arc<TypeParserRegistry>,
    separator: char,
}

impl DefaultArgumentParser {
    /// Creates a parser splitting on `separator` wherever the command's
    /// modules do not declare one.
    pub fn new(parsers: Arc<TypeParserRegistry>, separator: char) -> Self {
        Self { parsers, separator }
    }

    pub fn parsers(&self) -> &TypeParserRegistry {
        &self.parsers
    }
}

impl Default for DefaultArgumentParser {
    fn default() -> Self {
        Self::new(Arc::new(TypeParserRegistry::default()), ' ')
    }
}

#[async_trait]
impl ArgumentParser for DefaultArgumentParser {
    async fn parse(&self, _ctx: &RequestContext, command: &Command, remaining: &str) -> ParseOutcome {
        let separator = command
            .module()
            .and_then(|m| m.effective_separator())
            .unwrap_or(self.separator);
        let tokens = match try_shell_split(remaining, separator) {
            Ok(tokens) => tokens,
            Err(e) => return ParseOutcome::failed(e.to_string()),
        };

        let mut arguments = Arguments::new();
        for (i, param) in command.parameters().iter().enumerate() {
            let Some(parser) = self.parsers.get(param.type_id()) else {
                return ParseOutcome::failed_at(
                    param,
                    ParseError::NoParser(param.type_name()).to_string(),
                );
            };

            let rest = tokens.get(i..).unwrap_or_default();
            let value = if param.is_variadic() {
                match param.default_value() {
                    Some(default) if rest.is_empty() => Ok(default.clone()),
                    _ => parser.parse_many(rest),
                }
            } else if let Some(token) = rest.first() {
                parser.parse(token)
            } else if let Some(default) = param.default_value() {
                Ok(default.clone())
            } else if param.is_optional() {
                continue;
            } else {
                return ParseOutcome::failed_at(param, "missing value");
            };

            match value {
                Ok(value) => arguments.push(Arc::clone(param), value),
                Err(e) => return ParseOutcome::failed_at(param, e.to_string()),
            }
        }

        trace!(command = command.name(), arguments = ?arguments, "Parsed arguments");
        ParseOutcome::Parsed(arguments)
    }
}
