//! Dev server: configuration resolution and request dispatch.
//!
//! Resolution mirrors Vite: plugins are filtered by `apply`, ordered by
//! `enforce`, given a chance to edit the user config, then frozen into the
//! resolved plugin list with import analysis as the last builtin. Every
//! `config_resolved` hook runs after that list exists.

use std::path::PathBuf;
use std::sync::Arc;

use crate::dev::prebundle::{package_name_from_specifier, OptimizeOutcome, PreBundler};
use crate::dev::rewrite::{ImportAnalysisPlugin, MODULES_PREFIX};
use crate::dev::transform::{ModuleTransformer, TransformedModule};
use crate::error::{Error, Result};
use crate::plugin::{Command, DevConfig, PluginContainer, ResolvedConfig, SharedPlugin};

/// Normalize a user supplied base so it starts and ends with `/`.
pub fn normalize_base(base: Option<&str>) -> String {
    let base = base.map(str::trim).unwrap_or_default();
    if base.is_empty() || base == "/" || base == "./" {
        return "/".to_string();
    }
    let mut normalized = String::with_capacity(base.len() + 2);
    if !base.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(base);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Resolve `config` for `command`, running the `config` and
/// `config_resolved` hooks of `plugins`.
pub fn resolve_config(
    mut config: DevConfig,
    plugins: Vec<SharedPlugin>,
    command: Command,
) -> Result<ResolvedConfig> {
    let mut user_plugins: Vec<SharedPlugin> = plugins
        .into_iter()
        .filter(|p| p.apply().map_or(true, |apply| apply.applies_to(command)))
        .collect();
    user_plugins.sort_by_key(|p| p.enforce());

    for plugin in &user_plugins {
        plugin.config(&mut config)?;
    }

    let root = config.root.canonicalize().unwrap_or(config.root);
    let base = normalize_base(config.base.as_deref());

    let import_analysis: SharedPlugin = Arc::new(ImportAnalysisPlugin::new(
        root.clone(),
        base.clone(),
        user_plugins.clone(),
    ));

    let mut resolved_plugins = user_plugins.clone();
    resolved_plugins.push(import_analysis);

    let mut resolved = ResolvedConfig {
        root,
        base,
        command,
        optimize_deps: config.optimize_deps.unwrap_or_default(),
        plugins: resolved_plugins,
    };

    for plugin in &user_plugins {
        plugin.config_resolved(&mut resolved)?;
    }

    tracing::debug!(plugins = ?resolved.plugin_names(), base = %resolved.base, "resolved config");
    Ok(resolved)
}

/// Unbundled development server.
///
/// Owns the resolved configuration, the plugin pipeline, the dependency
/// optimizer and the per-module transform cache. Transport (HTTP, HMR) is
/// left to the embedder.
pub struct DevServer {
    config: ResolvedConfig,
    plugins: PluginContainer,
    prebundler: PreBundler,
    transformer: ModuleTransformer,
}

impl DevServer {
    /// Resolve `config` for serving and build the pipeline.
    pub fn new(config: DevConfig, plugins: Vec<SharedPlugin>) -> Result<Self> {
        let config = resolve_config(config, plugins, Command::Serve)?;
        let container = PluginContainer::from_resolved(&config);
        let prebundler = PreBundler::new(config.root.clone(), &config.optimize_deps);
        let transformer = ModuleTransformer::new(config.root.clone(), config.base.clone());

        Ok(Self {
            config,
            plugins: container,
            prebundler,
            transformer,
        })
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginContainer {
        &self.plugins
    }

    pub fn prebundler(&self) -> &PreBundler {
        &self.prebundler
    }

    /// Run the dependency optimizer over `entries` (paths relative to root).
    pub fn optimize_deps(&mut self, entries: &[&str]) -> Result<OptimizeOutcome> {
        let entries: Vec<PathBuf> = entries.iter().map(|e| self.config.root.join(e)).collect();
        self.prebundler.run(&entries)
    }

    /// Serve a module request.
    pub fn transform_request(&self, url: &str) -> Result<TransformedModule> {
        let modules_prefix = format!("{}{MODULES_PREFIX}", self.config.base);
        if let Some(specifier) = url.strip_prefix(&modules_prefix) {
            let pkg = package_name_from_specifier(specifier);
            let dep = self
                .prebundler
                .get(&pkg)
                .ok_or_else(|| Error::ModuleNotFound(url.to_string()))?;
            return Ok(TransformedModule {
                code: dep.code.clone(),
                content_type: "application/javascript",
                file_path: dep.output_path.display().to_string(),
            });
        }

        self.transformer.transform_module(url, &self.plugins)
    }

    /// Drop cached transforms of a changed file.
    pub fn invalidate(&self, file_path: &str) -> Vec<String> {
        self.transformer.invalidate(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::rewrite::IMPORT_ANALYSIS_PLUGIN;
    use crate::plugin::{HookResult, Plugin, PluginApply, PluginEnforce};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Named {
        name: &'static str,
        enforce: PluginEnforce,
        apply: Option<PluginApply>,
    }

    impl Named {
        fn new(name: &'static str, enforce: PluginEnforce) -> Arc<Self> {
            Arc::new(Self {
                name,
                enforce,
                apply: None,
            })
        }
    }

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn enforce(&self) -> PluginEnforce {
            self.enforce
        }

        fn apply(&self) -> Option<PluginApply> {
            self.apply
        }
    }

    /// Sets a base and appends a plugin once the config is resolved.
    struct Appender {
        config_calls: AtomicUsize,
    }

    impl Plugin for Appender {
        fn name(&self) -> &str {
            "appender"
        }

        fn config(&self, config: &mut DevConfig) -> HookResult<()> {
            self.config_calls.fetch_add(1, Ordering::SeqCst);
            config.base = Some("app".to_string());
            Ok(())
        }

        fn config_resolved(&self, config: &mut ResolvedConfig) -> HookResult<()> {
            config.plugins.push(Named::new("appended", PluginEnforce::Normal));
            Ok(())
        }
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base(None), "/");
        assert_eq!(normalize_base(Some("")), "/");
        assert_eq!(normalize_base(Some("./")), "/");
        assert_eq!(normalize_base(Some("app")), "/app/");
        assert_eq!(normalize_base(Some("/app")), "/app/");
        assert_eq!(normalize_base(Some("/app/")), "/app/");
    }

    #[test]
    fn test_resolve_config_orders_plugins() {
        let dir = TempDir::new().unwrap();
        let build_only: SharedPlugin = Arc::new(Named {
            name: "build-only",
            enforce: PluginEnforce::Normal,
            apply: Some(PluginApply::Build),
        });
        let plugins: Vec<SharedPlugin> = vec![
            Named::new("post", PluginEnforce::Post),
            build_only,
            Named::new("normal", PluginEnforce::Normal),
            Named::new("pre", PluginEnforce::Pre),
        ];

        let resolved =
            resolve_config(DevConfig::new(dir.path()), plugins, Command::Serve).unwrap();

        assert_eq!(
            resolved.plugin_names(),
            vec!["pre", "normal", "post", IMPORT_ANALYSIS_PLUGIN]
        );
        assert_eq!(resolved.base, "/");
    }

    #[test]
    fn test_config_resolved_appends_after_import_analysis() {
        let dir = TempDir::new().unwrap();
        let appender = Arc::new(Appender {
            config_calls: AtomicUsize::new(0),
        });

        let server = DevServer::new(DevConfig::new(dir.path()), vec![appender.clone() as SharedPlugin])
            .unwrap();

        assert_eq!(appender.config_calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.config().base, "/app/");
        assert_eq!(
            server.plugins().plugin_names(),
            vec!["appender", IMPORT_ANALYSIS_PLUGIN, "appended"]
        );
    }

    #[test]
    fn test_serves_source_and_prebundled_modules() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("src/main.js"),
            "import React from 'react';\nexport default React;\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("node_modules/react")).unwrap();
        fs::write(
            root.join("node_modules/react/index.js"),
            "export default { version: '18' };",
        )
        .unwrap();

        let mut server = DevServer::new(DevConfig::new(root), Vec::new()).unwrap();
        let outcome = server.optimize_deps(&["src/main.js"]).unwrap();
        assert_eq!(outcome, OptimizeOutcome::Optimized(vec!["react".to_string()]));

        let main = server.transform_request("/src/main.js").unwrap();
        assert_eq!(
            main.code,
            "import React from '/@modules/react';\nexport default React;\n"
        );

        let react = server.transform_request("/@modules/react").unwrap();
        assert_eq!(react.code, "export default { version: '18' };");

        let missing = server.transform_request("/@modules/vue").unwrap_err();
        assert!(matches!(missing, Error::ModuleNotFound(_)));
    }

    #[test]
    fn test_unresolved_import_fails_request() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.js"), "import log from 'custom-logger';\n").unwrap();

        let server = DevServer::new(DevConfig::new(dir.path()), Vec::new()).unwrap();
        let err = server.transform_request("/main.js").unwrap_err();

        assert!(err
            .to_string()
            .contains("Failed to resolve import \"custom-logger\" from \"/main.js\""));
    }
}
