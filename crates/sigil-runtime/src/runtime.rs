//! The line-oriented host.
//!
//! [`SigilRuntime`] loads a [`SigilConfig`], sets up logging, builds a
//! [`Dispatcher`] and feeds it input one line at a time.
//!
//! ```rust,ignore
//! use sigil_runtime::SigilRuntime;
//!
//! let runtime = SigilRuntime::builder()
//!     .config_file("sigil.toml")
//!     .module(math_module()?)
//!     .build()?;
//!
//! runtime
//!     .run_stdin(|line, result| match result {
//!         Ok(result) => println!("{result}"),
//!         Err(e) => eprintln!("{line}: {e}"),
//!     })
//!     .await?;
//! runtime.shutdown().await;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};

use sigil_core::{CommandResult, DispatchResult, Module, ResultKind, ServiceProvider};
use sigil_framework::{Dispatcher, DispatcherBuilder, FilterDescriptor, TypeParserRegistry};

use crate::config::{ConfigLoader, SigilConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// Counters of one [`SigilRuntime::run_lines`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Non-blank lines dispatched.
    pub lines: usize,
    /// Lines that ended in a success or a detached command.
    pub succeeded: usize,
    /// Lines that ended in any other result.
    pub failed: usize,
    /// Lines that ended in a usage error.
    pub errors: usize,
}

/// Hosts a dispatcher configured from a [`SigilConfig`].
pub struct SigilRuntime {
    config: SigilConfig,
    dispatcher: Arc<Dispatcher>,
}

impl SigilRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a loaded configuration.
    ///
    /// The configuration's dispatch section replaces whatever `dispatcher`
    /// was configured with. Logging is initialized unless a global
    /// subscriber already exists.
    pub fn from_config(config: SigilConfig, dispatcher: DispatcherBuilder) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let dispatcher = dispatcher.config(config.dispatch.clone()).build();
        info!(
            comparison = ?config.dispatch.comparison,
            separator = ?config.dispatch.separator,
            modules = dispatcher.modules().len(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn config(&self) -> &SigilConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Dispatches a single line.
    pub async fn execute(&self, line: &str) -> RuntimeResult<CommandResult> {
        Ok(self.dispatcher.execute(line).await?)
    }

    /// Dispatches every non-blank line of `reader` until it ends.
    ///
    /// `on_result` sees each line with its outcome; usage errors do not stop
    /// the loop.
    pub async fn run_lines<R, F>(&self, reader: R, mut on_result: F) -> RuntimeResult<RunStats>
    where
        R: AsyncBufRead + Unpin,
        F: FnMut(&str, &DispatchResult<CommandResult>),
    {
        let mut stats = RunStats::default();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            stats.lines += 1;

            let outcome = self.dispatcher.execute(line).await;
            match &outcome {
                Ok(result) if result.is_success() || result.kind() == ResultKind::Async => {
                    stats.succeeded += 1
                }
                Ok(_) => stats.failed += 1,
                Err(e) => {
                    warn!(line, error = %e, "Dispatch error");
                    stats.errors += 1;
                }
            }
            on_result(line, &outcome);
        }
        debug!(?stats, "Input exhausted");
        Ok(stats)
    }

    /// Runs [`run_lines`](Self::run_lines) over stdin until it ends or a
    /// shutdown signal arrives.
    pub async fn run_stdin<F>(&self, on_result: F) -> RuntimeResult<RunStats>
    where
        F: FnMut(&str, &DispatchResult<CommandResult>),
    {
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            stats = self.run_lines(stdin, on_result) => stats,
            signal = wait_for_shutdown() => {
                signal?;
                Ok(RunStats::default())
            }
        }
    }

    /// Waits for every detached command, then stops accepting new ones.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        info!("Runtime stopped");
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            ctrl_c = signal::ctrl_c() => {
                ctrl_c?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`SigilRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    dispatcher: DispatcherBuilder,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            dispatcher: DispatcherBuilder::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: SigilConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn module(mut self, module: Arc<Module>) -> Self {
        self.dispatcher = self.dispatcher.module(module);
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.dispatcher = self.dispatcher.filter(filter);
        self
    }

    pub fn services(mut self, services: Arc<dyn ServiceProvider>) -> Self {
        self.dispatcher = self.dispatcher.services(services);
        self
    }

    pub fn type_parsers(mut self, parsers: TypeParserRegistry) -> Self {
        self.dispatcher = self.dispatcher.type_parsers(parsers);
        self
    }

    /// Customizes the dispatcher beyond what this builder exposes, e.g.
    /// custom layers or another argument parser.
    pub fn dispatcher(mut self, f: impl FnOnce(DispatcherBuilder) -> DispatcherBuilder) -> Self {
        self.dispatcher = f(self.dispatcher);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<SigilRuntime> {
        let config = self.config_loader.load()?;
        SigilRuntime::from_config(config, self.dispatcher)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{BoxError, Command, CommandCall, Invoker, ModuleBuilder, Parameter};

    fn runtime() -> SigilRuntime {
        let math = ModuleBuilder::new("math")
            .alias("math")
            .command(
                Command::builder(
                    "add",
                    Invoker::object(|call: CommandCall| {
                        let a = call.arg::<i64>("a").copied().unwrap_or_default();
                        let b = call.arg::<i64>("b").copied().unwrap_or_default();
                        Ok::<_, BoxError>(a + b)
                    }),
                )
                .parameter(Parameter::builder::<i64>("a"))
                .parameter(Parameter::builder::<i64>("b")),
            )
            .build()
            .unwrap();
        SigilRuntime::builder()
            .search_path("/nonexistent/sigil")
            .without_env()
            .module(math)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_lines_counts_outcomes() {
        let runtime = runtime();
        let input: &[u8] = b"math add 1 2\n\n   \nmath add x 2\ncalc\nmath add 3 4\n";
        let mut seen = Vec::new();
        let stats = runtime
            .run_lines(input, |line, result| {
                seen.push((line.to_string(), result.as_ref().map(|r| r.kind()).ok()));
            })
            .await
            .unwrap();

        assert_eq!(
            stats,
            RunStats {
                lines: 4,
                succeeded: 2,
                failed: 2,
                errors: 0,
            }
        );
        assert_eq!(seen[0], ("math add 1 2".to_string(), Some(ResultKind::Success)));
        assert_eq!(seen[1].1, Some(ResultKind::ParseFailed));
        assert_eq!(seen[2].1, Some(ResultKind::CommandNotFound));
    }

    #[tokio::test]
    async fn test_execute_uses_loaded_config() {
        let runtime = runtime();
        assert_eq!(runtime.config(), &SigilConfig::default());
        let result = runtime.execute("math add 20 22").await.unwrap();
        assert_eq!(result.value().and_then(|v| v.downcast_ref::<i64>()), Some(&42));
        runtime.shutdown().await;
    }
}
