//! Keeps external ids out of dependency optimization.

use std::sync::Arc;

use devext_core::{
    HookResult, OnLoadOptions, OnLoadResult, OnResolveOptions, OnResolveResult, OptimizerPlugin,
    PluginBuild, ResolveKind,
};

use crate::matcher::{is_external, ExternalCriterion};
use crate::registry::ExternalRegistry;

/// Name the optimizer plugin registers under.
pub const OPTIMIZER_PLUGIN_NAME: &str = "externalize";

/// Namespace for entry points that must not be loaded.
///
/// The optimizer refuses to mark an entry point external, so matching entry
/// points are parked here instead and loaded as empty modules.
pub const EXTERNALIZED_NAMESPACE: &str = "externalized-modules";

/// Optimizer plugin marking matching imports external.
pub struct ExternalizeOptimizerPlugin {
    externals: Arc<[ExternalCriterion]>,
    registry: Arc<ExternalRegistry>,
}

impl ExternalizeOptimizerPlugin {
    pub fn new(externals: Arc<[ExternalCriterion]>, registry: Arc<ExternalRegistry>) -> Self {
        Self {
            externals,
            registry,
        }
    }
}

impl OptimizerPlugin for ExternalizeOptimizerPlugin {
    fn name(&self) -> &str {
        OPTIMIZER_PLUGIN_NAME
    }

    fn setup(&self, build: &mut PluginBuild) -> HookResult<()> {
        let externals = Arc::clone(&self.externals);
        let registry = Arc::clone(&self.registry);
        build.on_resolve(OnResolveOptions::any(), move |args| {
            let result = match args.kind {
                ResolveKind::ImportStatement if is_external(args.path, &externals) => {
                    OnResolveResult::external(args.path)
                }
                ResolveKind::EntryPoint if is_external(args.path, &externals) => {
                    OnResolveResult::in_namespace(args.path, EXTERNALIZED_NAMESPACE)
                }
                _ => return Ok(None),
            };
            if registry.insert(args.path) {
                tracing::debug!(id = args.path, source = "optimizer", "recorded external");
            }
            Ok(Some(result))
        });

        let externals = Arc::clone(&self.externals);
        build.on_load(OnLoadOptions::any(), move |args| {
            if args.namespace == EXTERNALIZED_NAMESPACE || is_external(args.path, &externals) {
                return Ok(Some(OnLoadResult::contents("")));
            }
            Ok(None)
        });

        Ok(())
    }
}
