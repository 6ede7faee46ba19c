//! Clap-backed argument parsing.
//!
//! A command whose arguments are easier to describe as a clap type declares
//! one parameter of that type and uses [`ClapArgumentParser`] as its parser:
//!
//! ```rust,ignore
//! use clap::Parser;
//! use sigil_framework::command::ClapArgumentParser;
//!
//! #[derive(Parser, Debug, Clone)]
//! struct Echo {
//!     /// Repeat count
//!     #[arg(short, long, default_value_t = 1)]
//!     times: u32,
//!     text: Vec<String>,
//! }
//!
//! let echo = Command::builder("echo", Invoker::object(|call: CommandCall| {
//!     let echo = call.arg::<Echo>("args").cloned().unwrap_or_default();
//!     Ok::<_, BoxError>(echo.text.join(" ").repeat(echo.times as usize))
//! }))
//! .parameter(ClapArgumentParser::<Echo>::parameter("args"))
//! .parser(ClapArgumentParser::<Echo>::as_override());
//! ```

mod parser;

pub use parser::ClapArgumentParser;
