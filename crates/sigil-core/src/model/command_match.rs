//! Search results of the alias matching engine.

use std::fmt;
use std::sync::Arc;

use super::command::Command;

/// One candidate produced by searching the alias index.
#[derive(Clone)]
pub struct CommandMatch {
    command: Arc<Command>,
    alias: String,
    raw_input: String,
    remaining: String,
}

impl CommandMatch {
    pub fn new(
        command: Arc<Command>,
        alias: impl Into<String>,
        raw_input: impl Into<String>,
        remaining: impl Into<String>,
    ) -> Self {
        Self {
            command,
            alias: alias.into(),
            raw_input: raw_input.into(),
            remaining: remaining.into(),
        }
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    /// The alias path as it appeared in the input.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The input that was searched.
    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    /// The input after the alias path, quoting preserved.
    pub fn remaining(&self) -> &str {
        &self.remaining
    }
}

impl fmt::Debug for CommandMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandMatch")
            .field("command", &self.command.name())
            .field("alias", &self.alias)
            .field("remaining", &self.remaining)
            .finish()
    }
}
