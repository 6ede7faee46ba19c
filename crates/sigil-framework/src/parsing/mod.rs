//! Argument parsing: tokenizers, per-type converters and the default
//! [`ArgumentParser`](sigil_core::ArgumentParser).

pub mod default;
pub mod split;
pub mod types;

pub use default::DefaultArgumentParser;
pub use split::{count_args, shell_split, try_shell_split};
pub use types::{FnParser, FromStrParser, TypeParser, TypeParserRegistry};
