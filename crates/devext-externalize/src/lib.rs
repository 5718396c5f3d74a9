#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

//! Dev-time module externalization for devext.
//!
//! Some modules must never reach the browser through the dev server: they
//! are provided at runtime by an import map or a global. This plugin keeps
//! them out of dependency optimization, answers the dev pipeline for them
//! with a stand-in module, and strips the `<base>@id/` prefix import
//! analysis puts in front of them so the browser sees the bare specifier.
//!
//! ```ignore
//! use devext_core::dev::DevServer;
//! use devext_core::DevConfig;
//! use devext_externalize::{externalize, ExternalizeOptions};
//!
//! let plugin = externalize(ExternalizeOptions::with_names(["custom-logger"]));
//! let server = DevServer::new(DevConfig::new("."), vec![plugin])?;
//! ```
//!
//! Only serving is affected. Production builds use the host's regular
//! `external` configuration.

pub mod error;
pub mod matcher;
pub mod optimizer_plugin;
pub mod options;
pub mod plugin;
pub mod prefix;
pub mod registry;

use std::sync::Arc;

use devext_core::SharedPlugin;

pub use error::{Error, Result};
pub use matcher::{is_external, ExternalCriterion, ExternalPredicate};
pub use optimizer_plugin::{ExternalizeOptimizerPlugin, EXTERNALIZED_NAMESPACE, OPTIMIZER_PLUGIN_NAME};
pub use options::{ExternalizeOptions, CONFIG_SECTION};
pub use plugin::{ExternalizePlugin, PLUGIN_NAME, STAND_IN_MODULE};
pub use prefix::{PrefixStripper, RemovePrefixPlugin, PREFIX_PLUGIN_NAME};
pub use registry::ExternalRegistry;

/// Create the externalize plugin, ready to hand to the dev server.
pub fn externalize(options: ExternalizeOptions) -> SharedPlugin {
    Arc::new(ExternalizePlugin::new(options))
}
