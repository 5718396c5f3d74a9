//! Plugin protocol for the dependency optimizer.
//!
//! The optimizer is the secondary bundler that pre-bundles dependencies
//! before serving. Its plugins follow esbuild's model: during `setup` a
//! plugin registers `on_resolve` and `on_load` callbacks, each guarded by a
//! path filter and an optional namespace.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex_lite::Regex;

use crate::plugin::HookResult;

/// Namespace of paths that live on disk.
pub const FILE_NAMESPACE: &str = "file";

/// Shared handle to an optimizer plugin.
pub type SharedOptimizerPlugin = Arc<dyn OptimizerPlugin>;

type ResolveCallback =
    Box<dyn Fn(&OnResolveArgs<'_>) -> HookResult<Option<OnResolveResult>> + Send + Sync>;
type LoadCallback = Box<dyn Fn(&OnLoadArgs<'_>) -> HookResult<Option<OnLoadResult>> + Send + Sync>;

/// Why the optimizer is resolving a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    /// A dependency the optimizer was asked to bundle.
    EntryPoint,
    /// `import foo from 'foo'`
    ImportStatement,
    /// `require('foo')`
    RequireCall,
    /// `import('foo')`
    DynamicImport,
}

impl ResolveKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        // https://esbuild.github.io/plugins/#on-resolve-arguments
        match self {
            Self::EntryPoint => "entry-point",
            Self::ImportStatement => "import-statement",
            Self::RequireCall => "require-call",
            Self::DynamicImport => "dynamic-import",
        }
    }
}

impl fmt::Display for ResolveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolveKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "entry-point" => Ok(Self::EntryPoint),
            "import-statement" => Ok(Self::ImportStatement),
            "require-call" => Ok(Self::RequireCall),
            "dynamic-import" => Ok(Self::DynamicImport),
            _ => Err(format!("Invalid resolve kind: {value:?}")),
        }
    }
}

/// Request descriptor handed to `on_resolve` callbacks.
#[derive(Debug, Clone, Copy)]
pub struct OnResolveArgs<'a> {
    pub path: &'a str,
    /// Empty for entry points.
    pub importer: &'a str,
    /// Namespace of the importer.
    pub namespace: &'a str,
    pub kind: ResolveKind,
}

/// Answer of an `on_resolve` callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnResolveResult {
    pub path: Option<String>,
    pub namespace: Option<String>,
    pub external: bool,
}

impl OnResolveResult {
    /// Keep `path` out of the bundle.
    pub fn external(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            namespace: None,
            external: true,
        }
    }

    /// Resolve `path` into a custom namespace; an `on_load` callback must load it.
    pub fn in_namespace(path: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            namespace: Some(namespace.into()),
            external: false,
        }
    }
}

/// Request descriptor handed to `on_load` callbacks.
#[derive(Debug, Clone, Copy)]
pub struct OnLoadArgs<'a> {
    pub path: &'a str,
    pub namespace: &'a str,
}

/// Answer of an `on_load` callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnLoadResult {
    pub contents: String,
}

impl OnLoadResult {
    pub fn contents(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }
}

/// Guard deciding which requests reach a callback.
#[derive(Debug, Clone)]
pub struct OnResolveOptions {
    /// Tested against the request path.
    pub filter: Regex,
    /// `None` matches every namespace.
    pub namespace: Option<String>,
}

/// `on_load` callbacks are guarded the same way as `on_resolve` ones.
pub type OnLoadOptions = OnResolveOptions;

impl OnResolveOptions {
    pub fn new(filter: Regex) -> Self {
        Self {
            filter,
            namespace: None,
        }
    }

    /// Guard that accepts every path in every namespace.
    ///
    /// # Panics
    ///
    /// Only if the constant `.*` pattern fails to compile, on the first call.
    #[must_use]
    pub fn any() -> Self {
        static ANY: OnceLock<Regex> = OnceLock::new();
        let filter = ANY.get_or_init(|| Regex::new(".*").expect("`.*` is a valid pattern"));
        Self::new(filter.clone())
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn accepts(&self, path: &str, namespace: &str) -> bool {
        self.namespace.as_deref().map_or(true, |ns| ns == namespace) && self.filter.is_match(path)
    }
}

struct Registered<F> {
    plugin: String,
    options: OnResolveOptions,
    callback: F,
}

/// Callback registry filled by [`OptimizerPlugin::setup`].
///
/// Callbacks run in registration order; the first one returning `Some`
/// answers the request.
#[derive(Default)]
pub struct PluginBuild {
    current_plugin: String,
    resolvers: Vec<Registered<ResolveCallback>>,
    loaders: Vec<Registered<LoadCallback>>,
}

impl PluginBuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `setup` for every plugin, in order.
    pub fn setup(plugins: &[SharedOptimizerPlugin]) -> HookResult<Self> {
        let mut build = Self::new();
        for plugin in plugins {
            plugin.name().clone_into(&mut build.current_plugin);
            plugin.setup(&mut build)?;
        }
        build.current_plugin.clear();
        Ok(build)
    }

    pub fn on_resolve<F>(&mut self, options: OnResolveOptions, callback: F)
    where
        F: Fn(&OnResolveArgs<'_>) -> HookResult<Option<OnResolveResult>> + Send + Sync + 'static,
    {
        self.resolvers.push(Registered {
            plugin: self.current_plugin.clone(),
            options,
            callback: Box::new(callback),
        });
    }

    pub fn on_load<F>(&mut self, options: OnLoadOptions, callback: F)
    where
        F: Fn(&OnLoadArgs<'_>) -> HookResult<Option<OnLoadResult>> + Send + Sync + 'static,
    {
        self.loaders.push(Registered {
            plugin: self.current_plugin.clone(),
            options,
            callback: Box::new(callback),
        });
    }

    /// Run matching `on_resolve` callbacks until one answers.
    pub fn resolve(&self, args: &OnResolveArgs<'_>) -> HookResult<Option<OnResolveResult>> {
        for registered in &self.resolvers {
            if !registered.options.accepts(args.path, args.namespace) {
                continue;
            }
            if let Some(result) = (registered.callback)(args)? {
                tracing::trace!(plugin = %registered.plugin, path = args.path, kind = %args.kind, "on_resolve answered");
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Run matching `on_load` callbacks until one answers.
    pub fn load(&self, args: &OnLoadArgs<'_>) -> HookResult<Option<OnLoadResult>> {
        for registered in &self.loaders {
            if !registered.options.accepts(args.path, args.namespace) {
                continue;
            }
            if let Some(result) = (registered.callback)(args)? {
                tracing::trace!(plugin = %registered.plugin, path = args.path, namespace = args.namespace, "on_load answered");
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Number of registered `(on_resolve, on_load)` callbacks.
    pub fn callback_counts(&self) -> (usize, usize) {
        (self.resolvers.len(), self.loaders.len())
    }
}

/// A plugin for the dependency optimizer.
pub trait OptimizerPlugin: Send + Sync {
    /// Unique name, used to detect duplicate registration.
    fn name(&self) -> &str;

    /// Register callbacks on `build`.
    fn setup(&self, build: &mut PluginBuild) -> HookResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Virtual;

    impl OptimizerPlugin for Virtual {
        fn name(&self) -> &str {
            "virtual"
        }

        fn setup(&self, build: &mut PluginBuild) -> HookResult<()> {
            build.on_resolve(
                OnResolveOptions::new(Regex::new("^virtual:").unwrap()),
                |args| Ok(Some(OnResolveResult::in_namespace(args.path, "virtual"))),
            );
            build.on_load(OnLoadOptions::any().with_namespace("virtual"), |_| {
                Ok(Some(OnLoadResult::contents("export default 1;")))
            });
            Ok(())
        }
    }

    fn args(path: &str, kind: ResolveKind) -> OnResolveArgs<'_> {
        OnResolveArgs {
            path,
            importer: "",
            namespace: FILE_NAMESPACE,
            kind,
        }
    }

    #[test]
    fn test_resolve_kind_round_trips_esbuild_names() {
        assert_eq!(ResolveKind::EntryPoint.to_string(), "entry-point");
        assert_eq!(ResolveKind::ImportStatement.to_string(), "import-statement");
        assert_eq!("require-call".parse(), Ok(ResolveKind::RequireCall));
        assert!("import".parse::<ResolveKind>().is_err());
    }

    #[test]
    fn test_filter_and_namespace_guard_callbacks() {
        let plugins: Vec<SharedOptimizerPlugin> = vec![Arc::new(Virtual)];
        let build = PluginBuild::setup(&plugins).unwrap();
        assert_eq!(build.callback_counts(), (1, 1));

        let resolved = build
            .resolve(&args("virtual:x", ResolveKind::ImportStatement))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.namespace.as_deref(), Some("virtual"));
        assert!(build
            .resolve(&args("react", ResolveKind::ImportStatement))
            .unwrap()
            .is_none());

        let loaded = build
            .load(&OnLoadArgs {
                path: "virtual:x",
                namespace: "virtual",
            })
            .unwrap();
        assert_eq!(loaded, Some(OnLoadResult::contents("export default 1;")));
        assert!(build
            .load(&OnLoadArgs {
                path: "virtual:x",
                namespace: FILE_NAMESPACE,
            })
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_any_accepts_every_path_and_namespace() {
        let any = OnResolveOptions::any();
        assert!(any.accepts("react", FILE_NAMESPACE));
        assert!(any.accepts("", "externalized-modules"));
        assert!(any.accepts("/abs/path/with.dots.js", "virtual"));
        assert_eq!(any.filter.as_str(), OnResolveOptions::any().filter.as_str());

        let scoped = OnResolveOptions::any().with_namespace("virtual");
        assert!(scoped.accepts("anything", "virtual"));
        assert!(!scoped.accepts("anything", FILE_NAMESPACE));
    }

    #[test]
    fn test_first_answer_wins() {
        let mut build = PluginBuild::new();
        build.on_resolve(OnResolveOptions::any(), |_| Ok(None));
        build.on_resolve(OnResolveOptions::any(), |args| {
            Ok(Some(OnResolveResult::external(args.path)))
        });
        build.on_resolve(OnResolveOptions::any(), |_| {
            Ok(Some(OnResolveResult::in_namespace("never", "never")))
        });

        let resolved = build
            .resolve(&args("lodash", ResolveKind::EntryPoint))
            .unwrap()
            .unwrap();
        assert!(resolved.external);
    }
}
