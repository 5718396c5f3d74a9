#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Host side of devext.
//!
//! Defines the two plugin protocols a devext plugin implements (the dev
//! pipeline's [`Plugin`] and the dependency optimizer's [`OptimizerPlugin`])
//! and a minimal unbundled dev pipeline that drives them in order.

pub mod dev;
pub mod error;
pub mod optimizer;
pub mod plugin;

pub use error::{Error, Result};
pub use optimizer::{
    OnLoadArgs, OnLoadOptions, OnLoadResult, OnResolveArgs, OnResolveOptions, OnResolveResult,
    OptimizerPlugin, PluginBuild, ResolveKind, SharedOptimizerPlugin, FILE_NAMESPACE,
};
pub use plugin::{
    Command, DevConfig, HookResult, LoadResult, OptimizeDepsConfig, OptimizerOptions, Plugin,
    PluginApply, PluginContainer, PluginContext, PluginEnforce, PluginError, ResolveIdResult,
    ResolvedConfig, SharedPlugin, TransformResult,
};
