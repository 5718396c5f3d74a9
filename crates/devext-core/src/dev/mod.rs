//! Vite-compatible unbundled development pipeline.
//!
//! Serves individual ES modules on demand instead of a single bundle.
//! Each request triggers a resolve → load → transform pipeline whose last
//! builtin stage is import analysis; third-party dependencies are
//! pre-bundled up front by the dependency optimizer.

pub mod config;
pub mod prebundle;
pub mod rewrite;
pub mod server;
pub mod transform;

pub use config::{find_config_file, load_config, ConfigFile, OptimizeDepsFileConfig};
pub use prebundle::{OptimizeOutcome, PreBundledDep, PreBundler};
pub use rewrite::{ImportAnalysisPlugin, ID_PREFIX, IMPORT_ANALYSIS_PLUGIN, MODULES_PREFIX};
pub use server::{normalize_base, resolve_config, DevServer};
pub use transform::{ModuleTransformer, TransformedModule};
