//! The dev-server plugin tying the interceptors together.

use std::sync::Arc;

use devext_core::{
    DevConfig, HookResult, LoadResult, OptimizeDepsConfig, OptimizerOptions, Plugin, PluginApply,
    PluginContext, PluginEnforce, ResolveIdResult, ResolvedConfig, SharedOptimizerPlugin,
};

use crate::matcher::{is_external, ExternalCriterion};
use crate::optimizer_plugin::{ExternalizeOptimizerPlugin, OPTIMIZER_PLUGIN_NAME};
use crate::options::ExternalizeOptions;
use crate::prefix::RemovePrefixPlugin;
use crate::registry::ExternalRegistry;

/// Name of the dev-server plugin.
pub const PLUGIN_NAME: &str = "devext-plugin-externalize";

/// Body served for every externalized id.
pub const STAND_IN_MODULE: &str = "export default {};";

/// Serve-only plugin externalizing matching modules.
///
/// - `config` installs [`ExternalizeOptimizerPlugin`] into the optimizer
/// - `config_resolved` appends [`RemovePrefixPlugin`] after import analysis
/// - `resolve_id` marks matching ids external
/// - `load` answers registry entries with [`STAND_IN_MODULE`]
pub struct ExternalizePlugin {
    externals: Arc<[ExternalCriterion]>,
    registry: Arc<ExternalRegistry>,
}

impl ExternalizePlugin {
    pub fn new(options: ExternalizeOptions) -> Self {
        Self {
            externals: options.into_shared(),
            registry: Arc::new(ExternalRegistry::new()),
        }
    }

    /// The registry shared with the interceptors.
    pub fn registry(&self) -> &Arc<ExternalRegistry> {
        &self.registry
    }

    pub fn externals(&self) -> &[ExternalCriterion] {
        &self.externals
    }

    fn record(&self, id: &str) {
        if self.registry.insert(id) {
            tracing::debug!(id, source = "resolve_id", "recorded external");
        }
    }
}

impl Plugin for ExternalizePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn enforce(&self) -> PluginEnforce {
        PluginEnforce::Pre
    }

    fn apply(&self) -> Option<PluginApply> {
        Some(PluginApply::Serve)
    }

    fn config(&self, config: &mut DevConfig) -> HookResult<()> {
        let plugins = config
            .optimize_deps
            .get_or_insert_with(OptimizeDepsConfig::default)
            .optimizer_options
            .get_or_insert_with(OptimizerOptions::default)
            .plugins
            .get_or_insert_with(Vec::new);

        if plugins.iter().any(|p| p.name() == OPTIMIZER_PLUGIN_NAME) {
            tracing::debug!("optimizer plugin already installed");
            return Ok(());
        }

        let optimizer: SharedOptimizerPlugin = Arc::new(ExternalizeOptimizerPlugin::new(
            Arc::clone(&self.externals),
            Arc::clone(&self.registry),
        ));
        plugins.push(optimizer);
        tracing::debug!("installed optimizer plugin");
        Ok(())
    }

    fn config_resolved(&self, config: &mut ResolvedConfig) -> HookResult<()> {
        config.plugins.push(Arc::new(RemovePrefixPlugin::new(
            config.base.clone(),
            Arc::clone(&self.registry),
        )));
        Ok(())
    }

    fn resolve_id(
        &self,
        specifier: &str,
        _importer: Option<&str>,
        _ctx: &PluginContext,
    ) -> HookResult<Option<ResolveIdResult>> {
        if self.registry.contains(specifier) {
            return Ok(Some(ResolveIdResult::external(specifier)));
        }
        if is_external(specifier, &self.externals) {
            self.record(specifier);
            return Ok(Some(ResolveIdResult::external(specifier)));
        }
        Ok(None)
    }

    fn load(&self, id: &str, _ctx: &PluginContext) -> HookResult<Option<LoadResult>> {
        if self.registry.contains(id) {
            return Ok(Some(LoadResult::code(STAND_IN_MODULE)));
        }
        Ok(None)
    }
}
