//! Alias index over the registered module trees.
//!
//! The index mirrors the module tree: every module with aliases becomes a
//! level reached by one of its alias tokens, and transparent groups are
//! overlaid onto the level of their parent. Searching walks the levels one
//! token at a time and reports every command alias it reaches.
//!
//! The index is rebuilt from scratch whenever the module list changes and
//! published by swapping a single `Arc`, so a search always runs against a
//! complete snapshot.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use sigil_core::{Command, CommandMatch, Module, StringComparison};

use crate::parsing::split::is_separator;

/// Thread-safe alias index.
///
/// # Example
///
/// ```rust,ignore
/// let cache = ModuleCache::new(StringComparison::IgnoreCase, ' ');
/// cache.add_module(math);
///
/// for m in cache.search("MATH add 2 3") {
///     println!("{} -> {}", m.alias(), m.remaining());
/// }
/// ```
pub struct ModuleCache {
    comparison: StringComparison,
    separator: char,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes writers so each rebuild starts from the latest module list.
    write: Mutex<()>,
}

#[derive(Default)]
struct Snapshot {
    modules: Vec<Arc<Module>>,
    root: Level,
}

enum Entry {
    Module(Arc<Level>),
    Command(Arc<Command>),
}

#[derive(Default)]
struct Level {
    separator: char,
    /// Characters ending a token on this level.
    stops: Vec<char>,
    entries: HashMap<String, Vec<Entry>>,
    /// Commands with an empty alias, reached by the level's path alone.
    bare: Vec<Arc<Command>>,
    /// Transparent groups searched at this level's position.
    overlays: Vec<Level>,
}

impl ModuleCache {
    /// Creates an empty cache comparing tokens with `comparison` and
    /// splitting on `separator` wherever modules do not declare their own.
    pub fn new(comparison: StringComparison, separator: char) -> Self {
        Self {
            comparison,
            separator,
            snapshot: RwLock::new(Arc::new(Snapshot {
                modules: Vec::new(),
                root: Level::new(separator),
            })),
            write: Mutex::new(()),
        }
    }

    pub fn comparison(&self) -> StringComparison {
        self.comparison
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Adds a top-level module and its sub-tree.
    ///
    /// Returns `false` if this exact module is already registered.
    pub fn add_module(&self, module: Arc<Module>) -> bool {
        let _guard = self.write.lock();
        let current = self.load();
        if current.modules.iter().any(|m| Arc::ptr_eq(m, &module)) {
            return false;
        }

        debug!(module = module.name(), "Adding module to alias index");
        let mut modules = current.modules.clone();
        modules.push(module);
        self.publish(modules);
        true
    }

    /// Removes a top-level module and its sub-tree.
    ///
    /// Returns `false` if the module was not registered.
    pub fn remove_module(&self, module: &Arc<Module>) -> bool {
        let _guard = self.write.lock();
        let current = self.load();
        let Some(pos) = current.modules.iter().position(|m| Arc::ptr_eq(m, module)) else {
            return false;
        };

        debug!(module = module.name(), "Removing module from alias index");
        let mut modules = current.modules.clone();
        modules.remove(pos);
        self.publish(modules);
        true
    }

    /// Removes every module.
    pub fn clear(&self) {
        let _guard = self.write.lock();
        self.publish(Vec::new());
    }

    /// The registered top-level modules, in registration order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.load().modules.clone()
    }

    /// Every registered command, depth first.
    pub fn commands(&self) -> Vec<Arc<Command>> {
        self.load()
            .modules
            .iter()
            .flat_map(|m| m.all_commands())
            .collect()
    }

    /// Finds every command alias that prefixes `input`.
    ///
    /// Disabled commands are included. The result is empty when nothing
    /// matches.
    pub fn search(&self, input: &str) -> Vec<CommandMatch> {
        let snapshot = self.load();
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut search = Search {
            comparison: self.comparison,
            raw_input: input,
            found: &mut found,
            seen: &mut seen,
        };
        search.level(&snapshot.root, input, "");

        trace!(input, matches = found.len(), "Alias search finished");
        found
    }

    fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn publish(&self, modules: Vec<Arc<Module>>) {
        let mut root = Level::new(self.separator);
        for module in &modules {
            root.insert_module(module, self.comparison, self.separator);
        }
        *self.snapshot.write() = Arc::new(Snapshot { modules, root });
    }
}

impl fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCache")
            .field("comparison", &self.comparison)
            .field("separator", &self.separator)
            .field("modules", &self.load().modules.len())
            .finish()
    }
}

// ============================================================================
// Index construction
// ============================================================================

impl Level {
    fn new(separator: char) -> Self {
        Self {
            separator,
            stops: vec![separator],
            ..Default::default()
        }
    }

    fn for_module(module: &Module, comparison: StringComparison, default: char) -> Self {
        let mut level = Self::new(module.effective_separator().unwrap_or(default));
        for command in module.commands() {
            for alias in command.aliases() {
                if alias.is_empty() {
                    level.bare.push(Arc::clone(command));
                } else {
                    level
                        .entries
                        .entry(comparison.normalize(alias).into_owned())
                        .or_default()
                        .push(Entry::Command(Arc::clone(command)));
                }
            }
        }
        for sub in module.submodules() {
            level.insert_module(sub, comparison, default);
        }
        level
    }

    fn insert_module(&mut self, module: &Module, comparison: StringComparison, default: char) {
        let child = Self::for_module(module, comparison, default);
        if module.is_group() {
            self.overlays.push(child);
            return;
        }

        if !self.stops.contains(&child.separator) {
            self.stops.push(child.separator);
        }
        let child = Arc::new(child);
        for alias in module.aliases() {
            self.entries
                .entry(comparison.normalize(alias).into_owned())
                .or_default()
                .push(Entry::Module(Arc::clone(&child)));
        }
    }

    fn is_stop(&self, ch: char) -> bool {
        ch.is_whitespace() || self.stops.iter().any(|&s| is_separator(ch, s))
    }

    /// Splits the next alias token off `input`.
    fn take_token<'a>(&self, input: &'a str) -> Option<(&'a str, &'a str)> {
        let start = self.skip_separators(input);
        if start.is_empty() {
            return None;
        }
        let end = start.find(|c| self.is_stop(c)).unwrap_or(start.len());
        Some(start.split_at(end))
    }

    fn skip_separators<'a>(&self, input: &'a str) -> &'a str {
        input.trim_start_matches(|c: char| c.is_whitespace() || is_separator(c, self.separator))
    }
}

// ============================================================================
// Search
// ============================================================================

struct Search<'a> {
    comparison: StringComparison,
    raw_input: &'a str,
    found: &'a mut Vec<CommandMatch>,
    seen: &'a mut HashSet<(usize, String)>,
}

impl Search<'_> {
    fn level(&mut self, level: &Level, input: &str, path: &str) {
        for overlay in &level.overlays {
            self.level(overlay, input, path);
        }

        if !path.is_empty() {
            for command in &level.bare {
                self.emit(command, path, level.skip_separators(input));
            }
        }

        let Some((token, rest)) = level.take_token(input) else {
            return;
        };
        let Some(entries) = level.entries.get(&*self.comparison.normalize(token)) else {
            return;
        };

        let alias = join(path, token, level.separator);
        for entry in entries {
            match entry {
                Entry::Command(command) => self.emit(command, &alias, level.skip_separators(rest)),
                Entry::Module(child) => self.level(child, rest, &alias),
            }
        }
    }

    fn emit(&mut self, command: &Arc<Command>, alias: &str, remaining: &str) {
        let key = (Arc::as_ptr(command) as usize, alias.to_string());
        if !self.seen.insert(key) {
            return;
        }
        trace!(command = command.name(), alias, "Alias matched");
        self.found.push(CommandMatch::new(
            Arc::clone(command),
            alias,
            self.raw_input,
            remaining,
        ));
    }
}

fn join(path: &str, token: &str, separator: char) -> String {
    if path.is_empty() {
        token.to_string()
    } else {
        format!("{path}{separator}{token}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{BoxError, Invoker, ModuleBuilder};

    fn noop() -> Invoker {
        Invoker::void(|_| Ok::<_, BoxError>(()))
    }

    fn math() -> Arc<Module> {
        ModuleBuilder::new("math")
            .alias("math")
            .command(Command::builder("add", noop()))
            .command(Command::builder("sub", noop()).aliases(["sub", "minus"]))
            .build()
            .unwrap()
    }

    fn aliases(matches: &[CommandMatch]) -> Vec<&str> {
        let mut out: Vec<&str> = matches.iter().map(|m| m.alias()).collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_search_module_path() {
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        assert!(cache.add_module(math()));

        let found = cache.search("math add 2 3");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].command().name(), "add");
        assert_eq!(found[0].alias(), "math add");
        assert_eq!(found[0].remaining(), "2 3");
        assert_eq!(found[0].raw_input(), "math add 2 3");

        assert!(cache.search("calc add 2 3").is_empty());
        assert!(cache.search("math").is_empty());
    }

    #[test]
    fn test_remaining_preserves_quotes() {
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        cache.add_module(math());
        let found = cache.search("math  minus  \"a b\" 'c'");
        assert_eq!(found[0].remaining(), "\"a b\" 'c'");
    }

    #[test]
    fn test_case_comparison() {
        let ordinal = ModuleCache::new(StringComparison::Ordinal, ' ');
        ordinal.add_module(math());
        assert!(ordinal.search("MATH ADD 1 2").is_empty());

        let ignore = ModuleCache::new(StringComparison::IgnoreCase, ' ');
        ignore.add_module(math());
        let found = ignore.search("MATH ADD 1 2");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].alias(), "MATH ADD");
    }

    #[test]
    fn test_transparent_group_and_bare_command() {
        let tools = ModuleBuilder::new("tools")
            .command(Command::builder("ping", noop()))
            .submodule(
                ModuleBuilder::new("help")
                    .alias("help")
                    .command(Command::builder("overview", noop()).alias(""))
                    .command(Command::builder("topic", noop())),
            )
            .command(Command::builder("root-bare", noop()).alias(""))
            .build()
            .unwrap();
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        cache.add_module(tools);

        assert_eq!(aliases(&cache.search("ping")), vec!["ping"]);
        assert_eq!(aliases(&cache.search("help")), vec!["help"]);
        assert_eq!(aliases(&cache.search("help topic x")), vec!["help", "help topic"]);
        assert!(cache.search("anything").is_empty());
    }

    #[test]
    fn test_module_separator() {
        let module = ModuleBuilder::new("cfg")
            .alias("cfg")
            .separator('.')
            .command(Command::builder("get", noop()))
            .build()
            .unwrap();
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        cache.add_module(module);

        let found = cache.search("cfg.get.key");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].alias(), "cfg.get");
        assert_eq!(found[0].remaining(), "key");
    }

    #[test]
    fn test_alias_round_trip() {
        let module = ModuleBuilder::new("admin")
            .aliases(["admin", "adm"])
            .submodule(
                ModuleBuilder::new("users")
                    .alias("users")
                    .command(Command::builder("kick", noop()).aliases(["kick", "k"])),
            )
            .build()
            .unwrap();
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        cache.add_module(Arc::clone(&module));

        for command in cache.commands() {
            for alias in command.full_aliases(' ') {
                let found = cache.search(&alias);
                assert!(
                    found
                        .iter()
                        .any(|m| Arc::ptr_eq(m.command(), &command) && m.alias() == alias),
                    "alias {alias} not found"
                );
            }
        }
    }

    #[test]
    fn test_add_remove_idempotent() {
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        let module = math();
        assert!(cache.add_module(Arc::clone(&module)));
        assert!(!cache.add_module(Arc::clone(&module)));
        assert_eq!(cache.modules().len(), 1);
        assert_eq!(cache.commands().len(), 2);

        assert!(cache.remove_module(&module));
        assert!(!cache.remove_module(&module));
        assert!(cache.search("math add").is_empty());
    }

    #[test]
    fn test_disabled_commands_are_found() {
        let module = math();
        module.commands()[0].set_enabled(false);
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        cache.add_module(module);
        assert_eq!(cache.search("math add").len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = ModuleCache::new(StringComparison::Ordinal, ' ');
        cache.add_module(math());
        cache.clear();
        assert!(cache.modules().is_empty());
        assert!(cache.search("math add").is_empty());
    }
}
