//! Plugin system for the dev pipeline.
//!
//! Provides a Vite-compatible plugin interface: configuration hooks that run
//! once at startup and per-module hooks (`resolve_id`, `load`, `transform`)
//! that run for every request.
//!
//! ## Example
//!
//! ```ignore
//! use devext_core::{HookResult, Plugin, PluginContext, TransformResult};
//!
//! struct Banner;
//!
//! impl Plugin for Banner {
//!     fn name(&self) -> &str { "banner" }
//!
//!     fn transform(&self, code: &str, _id: &str, _ctx: &PluginContext) -> HookResult<Option<TransformResult>> {
//!         Ok(Some(TransformResult::code(format!("// banner\n{code}"))))
//!     }
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::optimizer::SharedOptimizerPlugin;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Shared handle to a dev-pipeline plugin.
pub type SharedPlugin = Arc<dyn Plugin>;

/// Error from a plugin.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.into(),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

/// Which host command is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Unbundled dev serving.
    #[default]
    Serve,
    /// Production build.
    Build,
}

/// Context passed to per-module hooks.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    /// Project root.
    pub root: PathBuf,
    /// Running command.
    pub command: Command,
}

impl PluginContext {
    pub fn new(root: PathBuf, command: Command) -> Self {
        Self { root, command }
    }
}

/// Result of resolve hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveIdResult {
    /// Resolved module ID (usually a file path).
    pub id: String,
    /// Whether this module is external (not served or bundled).
    pub external: bool,
}

impl ResolveIdResult {
    /// Create an external module result.
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Result of load hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Module source code.
    pub code: String,
}

impl LoadResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Result of transform hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    /// Transformed code.
    pub code: String,
}

impl TransformResult {
    pub fn code(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// Plugin enforcement ordering.
///
/// Controls where a plugin runs relative to others in the pipeline.
/// Mirrors Vite's `enforce` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PluginEnforce {
    /// Runs before normal plugins (e.g., alias resolution).
    Pre,
    /// Default ordering (no enforcement).
    #[default]
    Normal,
    /// Runs after normal plugins.
    Post,
}

/// Restricts a plugin to one command. Mirrors Vite's `apply` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginApply {
    Serve,
    Build,
}

impl PluginApply {
    #[must_use]
    pub fn applies_to(self, command: Command) -> bool {
        matches!(
            (self, command),
            (Self::Serve, Command::Serve) | (Self::Build, Command::Build)
        )
    }
}

/// Options handed to the dependency optimizer.
#[derive(Clone, Default)]
pub struct OptimizerOptions {
    /// Optimizer plugins, run in order for every resolve/load.
    pub plugins: Option<Vec<SharedOptimizerPlugin>>,
}

impl fmt::Debug for OptimizerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .plugins
            .as_ref()
            .map(|plugins| plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>());
        f.debug_struct("OptimizerOptions")
            .field("plugins", &names)
            .finish()
    }
}

/// Dependency optimization section of the dev config.
#[derive(Debug, Clone, Default)]
pub struct OptimizeDepsConfig {
    /// Dependencies to pre-bundle even if the scanner never sees them.
    pub include: Vec<String>,
    /// Options for the secondary bundler.
    pub optimizer_options: Option<OptimizerOptions>,
}

/// Development server configuration as supplied by the user.
///
/// Passed to the `config` hook so plugins can modify it before resolution.
/// Nested sections are optional; plugins must create what they need.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Root directory of the project.
    pub root: PathBuf,
    /// Base public path.
    pub base: Option<String>,
    /// Dependency optimization options.
    pub optimize_deps: Option<OptimizeDepsConfig>,
}

impl DevConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base: None,
            optimize_deps: None,
        }
    }
}

impl Default for DevConfig {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

/// Final configuration, produced after every `config` hook ran.
///
/// `plugins` is the ordered list the pipeline executes. Plugins appended
/// from a `config_resolved` hook land after every builtin plugin,
/// including import analysis.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    /// Always starts and ends with `/`.
    pub base: String,
    pub command: Command,
    pub optimize_deps: OptimizeDepsConfig,
    pub plugins: Vec<SharedPlugin>,
}

impl ResolvedConfig {
    /// Names of the resolved plugins, in execution order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("root", &self.root)
            .field("base", &self.base)
            .field("command", &self.command)
            .field("optimize_deps", &self.optimize_deps)
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

/// The main plugin trait.
///
/// All hooks have default implementations that do nothing, so you only
/// need to implement the hooks you care about.
///
/// - `config` — Modify the user config before resolution
/// - `config_resolved` — Inspect (and append to) the resolved config
/// - `resolve_id` / `load` — First plugin returning `Some` wins
/// - `transform` — Every plugin runs, in list order
pub trait Plugin: Send + Sync {
    /// Plugin name for debugging and error messages.
    fn name(&self) -> &str;

    /// Plugin ordering: `Pre`, `Normal` (default), or `Post`.
    fn enforce(&self) -> PluginEnforce {
        PluginEnforce::Normal
    }

    /// Restrict the plugin to one command. `None` applies to both.
    fn apply(&self) -> Option<PluginApply> {
        None
    }

    /// Modify the dev config before it is resolved.
    fn config(&self, _config: &mut DevConfig) -> HookResult<()> {
        Ok(())
    }

    /// Called once after the config is resolved.
    fn config_resolved(&self, _config: &mut ResolvedConfig) -> HookResult<()> {
        Ok(())
    }

    /// Resolve a module specifier to an ID.
    ///
    /// Return `Some(result)` to handle this resolution, or `None` to let
    /// the next plugin or default resolver handle it.
    fn resolve_id(
        &self,
        _specifier: &str,
        _importer: Option<&str>,
        _ctx: &PluginContext,
    ) -> HookResult<Option<ResolveIdResult>> {
        Ok(None)
    }

    /// Load a module by ID.
    ///
    /// Return `Some(result)` to provide the module source, or `None` to let
    /// the next plugin or default loader handle it.
    fn load(&self, _id: &str, _ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        Ok(None)
    }

    /// Transform module source code.
    ///
    /// Return `Some(result)` to replace the code, or `None` to pass it through.
    fn transform(
        &self,
        _code: &str,
        _id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        Ok(None)
    }
}

/// A container for dispatching hooks over an ordered plugin list.
pub struct PluginContainer {
    plugins: Vec<SharedPlugin>,
    ctx: PluginContext,
}

impl PluginContainer {
    /// Create an empty container.
    pub fn new(root: PathBuf) -> Self {
        Self {
            plugins: Vec::new(),
            ctx: PluginContext::new(root, Command::Serve),
        }
    }

    /// Create a container that executes `config.plugins` exactly in order.
    pub fn from_resolved(config: &ResolvedConfig) -> Self {
        Self {
            plugins: config.plugins.clone(),
            ctx: PluginContext::new(config.root.clone(), config.command),
        }
    }

    /// Add a plugin after every plugin with the same or an earlier `enforce`.
    pub fn add(&mut self, plugin: SharedPlugin) {
        let enforce = plugin.enforce();
        let at = self
            .plugins
            .iter()
            .position(|p| p.enforce() > enforce)
            .unwrap_or(self.plugins.len());
        self.plugins.insert(at, plugin);
    }

    /// Get the context (read-only).
    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Plugin names in execution order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Try to resolve a module ID through plugins.
    /// Returns None if no plugin handled the resolution.
    pub fn resolve_id(
        &self,
        specifier: &str,
        importer: Option<&str>,
    ) -> HookResult<Option<ResolveIdResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.resolve_id(specifier, importer, &self.ctx)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Try to load a module through plugins.
    /// Returns None if no plugin handled the load.
    pub fn load(&self, id: &str) -> HookResult<Option<LoadResult>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.load(id, &self.ctx)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Transform code through all plugins.
    /// Each plugin's output is passed to the next plugin.
    pub fn transform(&self, code: &str, id: &str) -> HookResult<String> {
        let mut current = code.to_string();
        for plugin in &self.plugins {
            if let Some(result) = plugin.transform(&current, id, &self.ctx)? {
                current = result.code;
            }
        }
        Ok(current)
    }
}
