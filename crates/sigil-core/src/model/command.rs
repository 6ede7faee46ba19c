//! Commands.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::invoker::Invoker;
use super::module::Module;
use super::parameter::{Parameter, ParameterBuilder};
use super::parser::ParserOverride;
use super::precondition::Precondition;
use crate::foundation::config::{DispatchConfig, MultiMatchHandling, RunMode};
use crate::foundation::error::{DispatchError, DispatchResult};

/// A single invocable handler, addressable by alias within its module.
pub struct Command {
    name: String,
    aliases: Vec<String>,
    module: Weak<Module>,
    priority: i32,
    run_mode: Option<RunMode>,
    ignore_extra_args: Option<bool>,
    parameters: Vec<Arc<Parameter>>,
    preconditions: Vec<Arc<dyn Precondition>>,
    enabled: AtomicBool,
    invoker: Invoker,
    parser: Option<ParserOverride>,
    summary: Option<String>,
}

impl Command {
    /// Starts a command named `name` that runs `invoker`.
    ///
    /// Unless aliases are given the command is reachable by its name.
    pub fn builder(name: impl Into<String>, invoker: Invoker) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            aliases: Vec::new(),
            priority: 0,
            run_mode: None,
            ignore_extra_args: None,
            parameters: Vec::new(),
            preconditions: Vec::new(),
            enabled: true,
            invoker,
            parser: None,
            summary: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias tokens. An empty alias makes the command reachable by its
    /// module path alone.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The owning module.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// Tie-break weight; higher wins.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn parameters(&self) -> &[Arc<Parameter>] {
        &self.parameters
    }

    /// Preconditions declared on the command itself.
    pub fn preconditions(&self) -> &[Arc<dyn Precondition>] {
        &self.preconditions
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Effective enablement: the command and every enclosing module.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && self.module().is_none_or(|m| m.is_enabled())
    }

    /// Sets the command's own enabled flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Owning module followed by its ancestors, nearest first.
    pub fn module_chain(&self) -> Vec<Arc<Module>> {
        let mut chain = Vec::new();
        let mut current = self.module();
        while let Some(module) = current {
            current = module.parent();
            chain.push(module);
        }
        chain
    }

    /// Run mode: the command's own, else the nearest module's, else the
    /// configured default.
    pub fn effective_run_mode(&self, config: &DispatchConfig) -> RunMode {
        self.run_mode
            .or_else(|| self.module_chain().iter().find_map(|m| m.run_mode()))
            .unwrap_or(config.default_run_mode)
    }

    /// Whether surplus input tokens are tolerated.
    pub fn effective_ignore_extra_args(&self, config: &DispatchConfig) -> bool {
        self.ignore_extra_args
            .or_else(|| {
                self.module_chain()
                    .iter()
                    .find_map(|m| m.ignore_extra_args())
            })
            .unwrap_or(config.ignore_extra_args)
    }

    /// Multi-match handling of the nearest module that sets one.
    pub fn multi_match_handling(&self, config: &DispatchConfig) -> MultiMatchHandling {
        self.module_chain()
            .iter()
            .find_map(|m| m.multi_match_handling())
            .unwrap_or(config.multi_match_handling)
    }

    /// Parser declared on the command or the nearest module.
    pub fn parser_override(&self) -> Option<ParserOverride> {
        self.parser
            .clone()
            .or_else(|| self.module_chain().iter().find_map(|m| m.parser().cloned()))
    }

    /// Command preconditions followed by module preconditions, nearest
    /// module first.
    pub fn inherited_preconditions(&self) -> Vec<Arc<dyn Precondition>> {
        let mut all: Vec<Arc<dyn Precondition>> = self.preconditions.clone();
        for module in self.module_chain() {
            all.extend(module.preconditions().iter().cloned());
        }
        all
    }

    /// Number of parameters that must be supplied.
    pub fn required_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.is_optional()).count()
    }

    pub fn has_variadic(&self) -> bool {
        self.parameters.last().is_some_and(|p| p.is_variadic())
    }

    /// Number of trailing parameters that may be omitted.
    pub fn optional_tail_count(&self) -> usize {
        self.parameters
            .iter()
            .rev()
            .take_while(|p| p.is_optional())
            .count()
    }

    /// Accepted argument count in words, e.g. `2`, `1 to 2`, `at least 1`.
    pub fn arity_description(&self) -> String {
        let required = self.required_count();
        let total = self.parameters.len();
        if self.has_variadic() {
            format!("at least {required}")
        } else if required == total {
            total.to_string()
        } else {
            format!("{required} to {total}")
        }
    }

    /// Every alias path that reaches this command, joined by `separator`
    /// wherever a module does not set its own.
    pub fn full_aliases(&self, separator: char) -> Vec<String> {
        let mut prefixes = vec![String::new()];
        for module in self.module_chain().iter().rev() {
            if module.aliases().is_empty() {
                continue;
            }
            let sep = module
                .parent()
                .and_then(|p| p.effective_separator())
                .unwrap_or(separator);
            prefixes = prefixes
                .iter()
                .flat_map(|prefix| {
                    module
                        .aliases()
                        .iter()
                        .map(move |alias| join(prefix, alias, sep))
                })
                .collect();
        }
        let sep = self
            .module()
            .and_then(|m| m.effective_separator())
            .unwrap_or(separator);
        prefixes
            .iter()
            .flat_map(|prefix| self.aliases.iter().map(move |alias| join(prefix, alias, sep)))
            .filter(|path| !path.is_empty())
            .collect()
    }
}

fn join(prefix: &str, token: &str, sep: char) -> String {
    match (prefix.is_empty(), token.is_empty()) {
        (true, _) => token.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}{sep}{token}"),
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("priority", &self.priority)
            .field("parameters", &self.parameters.len())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Builder for [`Command`].
pub struct CommandBuilder {
    name: String,
    aliases: Vec<String>,
    priority: i32,
    run_mode: Option<RunMode>,
    ignore_extra_args: Option<bool>,
    parameters: Vec<ParameterBuilder>,
    preconditions: Vec<Arc<dyn Precondition>>,
    enabled: bool,
    invoker: Invoker,
    parser: Option<ParserOverride>,
    summary: Option<String>,
}

impl CommandBuilder {
    /// Adds an alias token. Pass `""` to make the command reachable by its
    /// module path alone.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds several alias tokens.
    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Sets the tie-break priority (default `0`).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the run mode.
    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = Some(mode);
        self
    }

    /// Overrides whether surplus input tokens are tolerated.
    pub fn ignore_extra_args(mut self, ignore: bool) -> Self {
        self.ignore_extra_args = Some(ignore);
        self
    }

    /// Appends a parameter.
    pub fn parameter(mut self, parameter: ParameterBuilder) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Adds a precondition.
    pub fn precondition(mut self, precondition: impl Precondition + 'static) -> Self {
        self.preconditions.push(Arc::new(precondition));
        self
    }

    /// Sets the initial enabled flag (default `true`).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Parses this command's input with `parser` instead of the default.
    pub fn parser(mut self, parser: ParserOverride) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Sets the help text.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub(crate) fn validate(&self, path: &str) -> DispatchResult<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::invalid(format!(
                "command in '{path}' has an empty name"
            )));
        }
        let last = self.parameters.len().saturating_sub(1);
        let mut seen_optional = false;
        for (i, param) in self.parameters.iter().enumerate() {
            let at = format!("parameter '{}' of '{path}.{}'", param.name(), self.name);
            if param.name().is_empty() {
                return Err(DispatchError::invalid(format!("{at} has an empty name")));
            }
            if self.parameters[..i].iter().any(|p| p.name() == param.name()) {
                return Err(DispatchError::invalid(format!("{at} is declared twice")));
            }
            if param.is_variadic() && i != last {
                return Err(DispatchError::invalid(format!(
                    "{at} is variadic but not the last parameter"
                )));
            }
            if seen_optional && !param.is_optional() {
                return Err(DispatchError::invalid(format!(
                    "{at} is required but follows an optional parameter"
                )));
            }
            if !param.default_matches_type() {
                return Err(DispatchError::invalid(format!(
                    "{at} has a default value of the wrong type"
                )));
            }
            seen_optional |= param.is_optional();
        }
        Ok(())
    }

    pub(crate) fn finish(self, module: Weak<Module>) -> Arc<Command> {
        let aliases = if self.aliases.is_empty() {
            vec![self.name.clone()]
        } else {
            self.aliases
        };
        let builders = self.parameters;
        Arc::new_cyclic(|me| Command {
            name: self.name,
            aliases,
            module,
            priority: self.priority,
            run_mode: self.run_mode,
            ignore_extra_args: self.ignore_extra_args,
            parameters: builders
                .into_iter()
                .enumerate()
                .map(|(i, b)| Arc::new(b.finish(i, me.clone())))
                .collect(),
            preconditions: self.preconditions,
            enabled: AtomicBool::new(self.enabled),
            invoker: self.invoker,
            parser: self.parser,
            summary: self.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::BoxError;
    use crate::model::module::ModuleBuilder;

    fn noop() -> Invoker {
        Invoker::void(|_| Ok::<_, BoxError>(()))
    }

    #[test]
    fn test_default_alias_is_name() {
        let module = ModuleBuilder::new("m")
            .command(Command::builder("ping", noop()))
            .build()
            .unwrap();
        assert_eq!(module.commands()[0].aliases(), ["ping"]);
    }

    #[test]
    fn test_parameters_link_back() {
        let module = ModuleBuilder::new("m")
            .command(
                Command::builder("add", noop())
                    .parameter(Parameter::builder::<i64>("a"))
                    .parameter(Parameter::builder::<i64>("b").default_value(1_i64)),
            )
            .build()
            .unwrap();
        let command = &module.commands()[0];
        let b = &command.parameters()[1];
        assert_eq!(b.position(), 1);
        assert!(Arc::ptr_eq(&b.command().unwrap(), command));
        assert_eq!(command.required_count(), 1);
        assert_eq!(command.optional_tail_count(), 1);
        assert_eq!(command.arity_description(), "1 to 2");
    }

    #[test]
    fn test_enablement_follows_module() {
        let module = ModuleBuilder::new("m")
            .command(Command::builder("ping", noop()))
            .build()
            .unwrap();
        let command = &module.commands()[0];
        assert!(command.is_enabled());
        module.set_enabled(false);
        assert!(!command.is_enabled());
        module.set_enabled(true);
        command.set_enabled(false);
        assert!(!command.is_enabled());
    }

    #[test]
    fn test_overrides_fall_back_through_modules() {
        let module = ModuleBuilder::new("outer")
            .run_mode(RunMode::Concurrent)
            .submodule(
                ModuleBuilder::new("inner")
                    .ignore_extra_args(true)
                    .command(Command::builder("a", noop()))
                    .command(Command::builder("b", noop()).run_mode(RunMode::Sequential)),
            )
            .build()
            .unwrap();
        let config = DispatchConfig::default();
        let inner = &module.submodules()[0];
        let a = &inner.commands()[0];
        let b = &inner.commands()[1];

        assert_eq!(a.effective_run_mode(&config), RunMode::Concurrent);
        assert_eq!(b.effective_run_mode(&config), RunMode::Sequential);
        assert!(a.effective_ignore_extra_args(&config));
        assert_eq!(a.module_chain().len(), 2);
    }

    #[test]
    fn test_full_aliases() {
        let module = ModuleBuilder::new("math")
            .aliases(["math", "m"])
            .submodule(
                ModuleBuilder::new("ops").command(Command::builder("add", noop()).aliases(["add", "+"])),
            )
            .command(Command::builder("help", noop()).alias(""))
            .build()
            .unwrap();

        let add = &module.submodules()[0].commands()[0];
        let mut aliases = add.full_aliases(' ');
        aliases.sort();
        assert_eq!(aliases, ["m +", "m add", "math +", "math add"]);

        let help = &module.commands()[0];
        assert_eq!(help.full_aliases(' '), ["math", "m"]);
    }

    #[test]
    fn test_validation_rejects_bad_parameter_order() {
        let err = ModuleBuilder::new("m")
            .command(
                Command::builder("c", noop())
                    .parameter(Parameter::builder::<String>("rest").variadic())
                    .parameter(Parameter::builder::<i64>("n")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("variadic"));

        let err = ModuleBuilder::new("m")
            .command(
                Command::builder("c", noop())
                    .parameter(Parameter::builder::<i64>("a").optional())
                    .parameter(Parameter::builder::<i64>("b")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("follows an optional"));
    }
}
