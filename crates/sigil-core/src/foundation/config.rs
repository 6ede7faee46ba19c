//! Matching and execution defaults shared by the matching engine and the
//! request pipeline.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// How alias tokens are compared against input tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringComparison {
    /// Exact, case-sensitive comparison.
    #[default]
    Ordinal,
    /// Case-insensitive comparison (Unicode lowercase folding).
    IgnoreCase,
}

impl StringComparison {
    /// Normalizes a token into the key used by alias indexes.
    pub fn normalize(self, token: &str) -> Cow<'_, str> {
        match self {
            Self::Ordinal => Cow::Borrowed(token),
            Self::IgnoreCase => Cow::Owned(token.to_lowercase()),
        }
    }
}

/// Whether the pipeline awaits a command handler or detaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// The handler is awaited before the pipeline completes.
    #[default]
    Sequential,
    /// The handler runs on a detached task; the caller receives
    /// [`CommandResult::Async`](crate::CommandResult::Async).
    Concurrent,
}

/// How a module treats input that matches more than one of its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiMatchHandling {
    /// Ambiguity is reported as a multi-match error when nothing can be
    /// narrowed down.
    Error,
    /// The best surviving candidate is chosen automatically.
    #[default]
    Best,
}

/// Dispatch-wide defaults.
///
/// Modules and commands may override the run mode, extra-argument handling,
/// multi-match handling and separator; everything else applies globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Alias comparison mode.
    #[serde(default)]
    pub comparison: StringComparison,

    /// Token separator used when no module overrides it.
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Run mode for commands and modules that do not set one.
    #[serde(default)]
    pub default_run_mode: RunMode,

    /// Whether surplus input tokens are ignored by default.
    #[serde(default)]
    pub ignore_extra_args: bool,

    /// Multi-match handling for modules that do not set one.
    #[serde(default)]
    pub multi_match_handling: MultiMatchHandling,

    /// Whether more than one successfully parsed candidate continues into
    /// the precondition stages. When `false` the highest-priority candidate
    /// is chosen right after parsing.
    #[serde(default = "default_true")]
    pub continue_after_parse: bool,

    /// Whether the request context is disposed automatically at the end of
    /// the pipeline.
    #[serde(default = "default_true")]
    pub auto_dispose: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            comparison: StringComparison::default(),
            separator: default_separator(),
            default_run_mode: RunMode::default(),
            ignore_extra_args: false,
            multi_match_handling: MultiMatchHandling::default(),
            continue_after_parse: true,
            auto_dispose: true,
        }
    }
}

fn default_separator() -> char {
    ' '
}

fn default_true() -> bool {
    true
}
