//! Modules: named, nestable groups of commands.
//!
//! A module with aliases contributes one token to the alias path of every
//! command below it. A module without aliases is a transparent group: its
//! commands and sub-modules are addressed as if they were declared on the
//! parent.
//!
//! Module trees are immutable once built, apart from the enabled flags.
//!
//! ```rust,ignore
//! let admin = ModuleBuilder::new("admin")
//!     .alias("admin")
//!     .multi_match_handling(MultiMatchHandling::Error)
//!     .precondition(admin_only)
//!     .submodule(ModuleBuilder::new("users").alias("users").command(kick))
//!     .build()?;
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use super::command::{Command, CommandBuilder};
use super::parser::ParserOverride;
use super::precondition::Precondition;
use crate::foundation::config::{MultiMatchHandling, RunMode};
use crate::foundation::context::RequestContext;
use crate::foundation::dispose::AsyncDisposable;
use crate::foundation::error::{BoxError, DispatchError, DispatchResult};
use crate::foundation::result::CommandResult;
use crate::foundation::services::{ServiceArc, ServiceProvider};

// ============================================================================
// Module instances
// ============================================================================

/// Per-request state object shared by the commands of one module.
///
/// The hooks run around every command of the module. Instances are taken
/// from the request's service scope when registered there; otherwise they are
/// activated for the request and disposed when it ends.
#[async_trait]
pub trait CommandModule: Send + Sync + 'static {
    /// Runs before the command handler.
    async fn before_execute(
        &self,
        _ctx: &RequestContext,
        _command: &Command,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after the command handler with its result.
    async fn after_execute(
        &self,
        _ctx: &RequestContext,
        _command: &Command,
        _result: &CommandResult,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases an activated instance at the end of the request.
    async fn dispose(&self) {}
}

/// A resolved module instance.
#[derive(Clone)]
pub struct ModuleInstance {
    hooks: Arc<dyn CommandModule>,
    any: Arc<dyn Any + Send + Sync>,
}

impl ModuleInstance {
    pub fn new<M: CommandModule>(module: Arc<M>) -> Self {
        Self {
            hooks: module.clone(),
            any: module,
        }
    }

    /// The lifecycle hooks.
    pub fn hooks(&self) -> &dyn CommandModule {
        self.hooks.as_ref()
    }

    /// The concrete instance, if it has type `M`.
    pub fn downcast<M: Any + Send + Sync>(&self) -> Option<Arc<M>> {
        Arc::clone(&self.any).downcast::<M>().ok()
    }
}

#[async_trait]
impl AsyncDisposable for ModuleInstance {
    async fn dispose_async(&self) {
        self.hooks.dispose().await;
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance").finish_non_exhaustive()
    }
}

type Activate = Arc<dyn Fn() -> ModuleInstance + Send + Sync>;
type FromService = fn(ServiceArc) -> Option<ModuleInstance>;

fn instance_from_service<M: CommandModule>(svc: ServiceArc) -> Option<ModuleInstance> {
    svc.downcast::<M>().ok().map(ModuleInstance::new)
}

/// Knows how to obtain a module's instance for one request.
#[derive(Clone)]
pub struct ModuleActivator {
    type_id: TypeId,
    type_name: &'static str,
    activate: Activate,
    from_service: FromService,
}

impl ModuleActivator {
    /// Activates `M` through its `Default` implementation.
    pub fn of<M: CommandModule + Default>() -> Self {
        Self::with(M::default)
    }

    /// Activates `M` through `factory`.
    pub fn with<M, F>(factory: F) -> Self
    where
        M: CommandModule,
        F: Fn() -> M + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
            activate: Arc::new(move || ModuleInstance::new(Arc::new(factory()))),
            from_service: instance_from_service::<M>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Resolves the instance from `services`, or activates a new one.
    ///
    /// The flag is `true` when the instance was activated and therefore
    /// belongs to the request.
    pub fn resolve(&self, services: &dyn ServiceProvider) -> (ModuleInstance, bool) {
        match services.resolve(self.type_id).and_then(self.from_service) {
            Some(instance) => (instance, false),
            None => ((self.activate)(), true),
        }
    }
}

impl fmt::Debug for ModuleActivator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleActivator")
            .field(&self.type_name)
            .finish()
    }
}

// ============================================================================
// Module
// ============================================================================

/// A named group of commands and sub-modules.
pub struct Module {
    name: String,
    aliases: Vec<String>,
    parent: Weak<Module>,
    submodules: Vec<Arc<Module>>,
    commands: Vec<Arc<Command>>,
    enabled: AtomicBool,
    run_mode: Option<RunMode>,
    ignore_extra_args: Option<bool>,
    multi_match: Option<MultiMatchHandling>,
    preconditions: Vec<Arc<dyn Precondition>>,
    separator: Option<char>,
    activator: Option<ModuleActivator>,
    parser: Option<ParserOverride>,
    summary: Option<String>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias tokens. Empty for transparent groups.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Returns `true` for a module without aliases.
    pub fn is_group(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn parent(&self) -> Option<Arc<Module>> {
        self.parent.upgrade()
    }

    pub fn submodules(&self) -> &[Arc<Module>] {
        &self.submodules
    }

    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    /// Effective enablement: this module and every ancestor.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && self.parent().is_none_or(|p| p.is_enabled())
    }

    /// Sets this module's own enabled flag.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn run_mode(&self) -> Option<RunMode> {
        self.run_mode
    }

    pub fn ignore_extra_args(&self) -> Option<bool> {
        self.ignore_extra_args
    }

    pub fn multi_match_handling(&self) -> Option<MultiMatchHandling> {
        self.multi_match
    }

    /// Preconditions inherited by every command below this module.
    pub fn preconditions(&self) -> &[Arc<dyn Precondition>] {
        &self.preconditions
    }

    /// The separator declared on this module.
    pub fn separator(&self) -> Option<char> {
        self.separator
    }

    /// The separator of this module or the nearest ancestor declaring one.
    pub fn effective_separator(&self) -> Option<char> {
        self.separator
            .or_else(|| self.parent().and_then(|p| p.effective_separator()))
    }

    /// How the commands' module instance is obtained, if they use one.
    pub fn activator(&self) -> Option<&ModuleActivator> {
        self.activator.as_ref()
    }

    /// The activator of this module or the nearest ancestor declaring one.
    pub fn effective_activator(&self) -> Option<ModuleActivator> {
        self.activator
            .clone()
            .or_else(|| self.parent().and_then(|p| p.effective_activator()))
    }

    pub fn parser(&self) -> Option<&ParserOverride> {
        self.parser.as_ref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Every command in this module and its sub-modules, depth first.
    pub fn all_commands(&self) -> Vec<Arc<Command>> {
        let mut out: Vec<Arc<Command>> = self.commands.clone();
        for sub in &self.submodules {
            out.extend(sub.all_commands());
        }
        out
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("submodules", &self.submodules.len())
            .field("commands", &self.commands.len())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ModuleBuilder
// ============================================================================

/// Builder for [`Module`] trees.
pub struct ModuleBuilder {
    name: String,
    aliases: Vec<String>,
    submodules: Vec<ModuleBuilder>,
    commands: Vec<CommandBuilder>,
    enabled: bool,
    run_mode: Option<RunMode>,
    ignore_extra_args: Option<bool>,
    multi_match: Option<MultiMatchHandling>,
    preconditions: Vec<Arc<dyn Precondition>>,
    separator: Option<char>,
    activator: Option<ModuleActivator>,
    parser: Option<ParserOverride>,
    summary: Option<String>,
}

impl ModuleBuilder {
    /// Starts a module. Without aliases it is a transparent group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            submodules: Vec::new(),
            commands: Vec::new(),
            enabled: true,
            run_mode: None,
            ignore_extra_args: None,
            multi_match: None,
            preconditions: Vec::new(),
            separator: None,
            activator: None,
            parser: None,
            summary: None,
        }
    }

    /// Adds an alias token.
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

    /// Adds a nested module.
    pub fn submodule(mut self, module: ModuleBuilder) -> Self {
        self.submodules.push(module);
        self
    }

    /// Adds a command.
    pub fn command(mut self, command: CommandBuilder) -> Self {
        self.commands.push(command);
        self
    }

    /// Sets the initial enabled flag (default `true`).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Default run mode for the commands below.
    pub fn run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = Some(mode);
        self
    }

    /// Default extra-argument handling for the commands below.
    pub fn ignore_extra_args(mut self, ignore: bool) -> Self {
        self.ignore_extra_args = Some(ignore);
        self
    }

    /// How ambiguous matches below this module are handled.
    pub fn multi_match_handling(mut self, handling: MultiMatchHandling) -> Self {
        self.multi_match = Some(handling);
        self
    }

    /// Adds a precondition inherited by every command below.
    pub fn precondition(mut self, precondition: impl Precondition + 'static) -> Self {
        self.preconditions.push(Arc::new(precondition));
        self
    }

    /// Splits tokens below this module on `separator`.
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Gives the commands below a module instance of type `M`.
    pub fn instance<M: CommandModule + Default>(mut self) -> Self {
        self.activator = Some(ModuleActivator::of::<M>());
        self
    }

    /// Gives the commands below a module instance obtained through
    /// `activator`.
    pub fn activator(mut self, activator: ModuleActivator) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Parses the input of the commands below with `parser`.
    pub fn parser(mut self, parser: ParserOverride) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Sets the help text.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Validates and freezes the tree.
    pub fn build(self) -> DispatchResult<Arc<Module>> {
        self.validate("")?;
        Ok(self.finish(Weak::new()))
    }

    fn validate(&self, parent_path: &str) -> DispatchResult<()> {
        if self.name.trim().is_empty() {
            return Err(DispatchError::invalid(format!(
                "module under '{parent_path}' has an empty name"
            )));
        }
        let path = if parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{parent_path}.{}", self.name)
        };
        if self.aliases.iter().any(|a| a.trim().is_empty()) {
            return Err(DispatchError::invalid(format!(
                "module '{path}' has an empty alias"
            )));
        }
        if let Some(sep) = self.separator.filter(|&sep| self.aliases.iter().any(|a| a.contains(sep))) {
            return Err(DispatchError::invalid(format!(
                "an alias of module '{path}' contains its separator {sep:?}"
            )));
        }
        for command in &self.commands {
            command.validate(&path)?;
        }
        for sub in &self.submodules {
            sub.validate(&path)?;
        }
        Ok(())
    }

    fn finish(self, parent: Weak<Module>) -> Arc<Module> {
        let commands = self.commands;
        let submodules = self.submodules;
        Arc::new_cyclic(|me| Module {
            name: self.name,
            aliases: self.aliases,
            parent,
            submodules: submodules
                .into_iter()
                .map(|b| b.finish(me.clone()))
                .collect(),
            commands: commands.into_iter().map(|b| b.finish(me.clone())).collect(),
            enabled: AtomicBool::new(self.enabled),
            run_mode: self.run_mode,
            ignore_extra_args: self.ignore_extra_args,
            multi_match: self.multi_match,
            preconditions: self.preconditions,
            separator: self.separator,
            activator: self.activator,
            parser: self.parser,
            summary: self.summary,
        })
    }
}
