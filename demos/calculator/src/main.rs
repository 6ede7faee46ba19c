//! Calculator Example
//!
//! Reads commands from stdin, one per line, and prints each result.
//!
//! ```text
//! math add 2 3        -> 5
//! math div 1 0        -> parameter 'b' rejected: division by zero
//! math sum 1 2 3 4    -> 10
//! echo -t 2 hello     -> "hello hello"
//! sleep 500           -> runs in the background, prints when done
//! math stats          -> successful math commands in this session
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package calculator -- --config sigil.toml --profile dev
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use sigil::prelude::*;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "calculator", about = "A line-oriented calculator")]
struct Cli {
    /// Configuration file to load instead of searching for sigil.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `dev` or `production`.
    #[arg(short, long)]
    profile: Option<String>,
}

/// Arguments of the `echo` command, parsed by clap.
#[derive(Parser, Debug)]
#[command(name = "echo")]
struct EchoArgs {
    /// Repeat the text this many times.
    #[arg(short, long, default_value_t = 1)]
    times: usize,

    text: Vec<String>,
}

// ============================================================================
// Module instance
// ============================================================================

/// Counts the successful commands of the `math` module.
///
/// One shared instance lives in the service collection; without it every
/// request would activate a fresh one.
#[derive(Default)]
struct Session {
    executed: AtomicUsize,
}

#[async_trait]
impl CommandModule for Session {
    async fn after_execute(
        &self,
        _ctx: &RequestContext,
        _command: &Command,
        result: &CommandResult,
    ) -> Result<(), BoxError> {
        if result.is_success() {
            self.executed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

// ============================================================================
// Commands
// ============================================================================

fn binary(name: &str, op: fn(f64, f64) -> f64) -> CommandBuilder {
    Command::builder(
        name,
        Invoker::object(move |call: CommandCall| {
            let a = call.arg::<f64>("a").copied().unwrap_or_default();
            let b = call.arg::<f64>("b").copied().unwrap_or_default();
            Ok::<_, BoxError>(op(a, b))
        }),
    )
    .parameter(Parameter::builder::<f64>("a"))
}

fn math_module() -> Result<Arc<Module>> {
    let non_zero = parameter_precondition("non_zero", |_, value: &AnyValue| {
        match value.downcast_ref::<f64>() {
            Some(v) if *v == 0.0 => Err("division by zero".to_string()),
            _ => Ok(()),
        }
    });

    let module = ModuleBuilder::new("math")
        .alias("math")
        .instance::<Session>()
        .summary("Arithmetic on floating point numbers")
        .command(binary("add", |a, b| a + b).parameter(Parameter::builder::<f64>("b")))
        .command(binary("sub", |a, b| a - b).parameter(Parameter::builder::<f64>("b")))
        .command(binary("mul", |a, b| a * b).parameter(Parameter::builder::<f64>("b")))
        .command(
            binary("div", |a, b| a / b)
                .parameter(Parameter::builder::<f64>("b").precondition(non_zero)),
        )
        .command(
            Command::builder(
                "sum",
                Invoker::object(|call: CommandCall| {
                    let values = call.arg::<Vec<f64>>("values").cloned().unwrap_or_default();
                    Ok::<_, BoxError>(values.iter().sum::<f64>())
                }),
            )
            .parameter(Parameter::builder::<f64>("values").variadic()),
        )
        .command(
            Command::builder(
                "stats",
                Invoker::object(|call: CommandCall| {
                    let session = call
                        .module::<Session>()
                        .ok_or("math session not available")?;
                    Ok::<_, BoxError>(session.executed.load(Ordering::Relaxed))
                }),
            ),
        )
        .build()?;
    Ok(module)
}

fn tools_module() -> Result<Arc<Module>> {
    let module = ModuleBuilder::new("tools")
        .command(
            Command::builder(
                "echo",
                Invoker::object(|call: CommandCall| {
                    let args = call.arg::<EchoArgs>("args").ok_or("missing arguments")?;
                    let line = args.text.join(" ");
                    Ok::<_, BoxError>(vec![line; args.times].join(" "))
                }),
            )
            .parser(ClapArgumentParser::<EchoArgs>::as_override())
            .parameter(ClapArgumentParser::<EchoArgs>::parameter("args")),
        )
        .command(
            Command::builder(
                "sleep",
                Invoker::object_async(|call: CommandCall| {
                    let ms = call.arg::<u64>("ms").copied().unwrap_or(100);
                    async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        Ok::<_, BoxError>(format!("slept {ms}ms"))
                    }
                }),
            )
            .run_mode(RunMode::Concurrent)
            .parameter(Parameter::builder::<u64>("ms").default_value(100_u64)),
        )
        .build()?;
    Ok(module)
}

// ============================================================================
// Output
// ============================================================================

fn print_result(line: &str, outcome: &DispatchResult<CommandResult>) {
    match outcome {
        Ok(CommandResult::Async(handle)) => {
            let handle = handle.clone();
            let line = line.to_string();
            tokio::spawn(async move {
                let result = handle.wait().await;
                println!("[{line}] {result}");
            });
        }
        Ok(result) => println!("{result}"),
        Err(e) => eprintln!("error: {e}"),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_results = FilterDescriptor::instance(LogResultFilter)
        .serves::<ResultFilters>()
        .serves::<ExceptionFilters>()
        .build()?;

    let mut builder = SigilRuntime::builder()
        .module(math_module()?)
        .module(tools_module()?)
        .services(ServiceCollection::new().singleton(Session::default()).build())
        .filter(log_results);
    if let Some(path) = cli.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = cli.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;

    info!("Calculator ready, reading commands from stdin");
    let stats = runtime.run_stdin(print_result).await?;
    info!(
        lines = stats.lines,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Input finished"
    );

    runtime.shutdown().await;
    Ok(())
}
