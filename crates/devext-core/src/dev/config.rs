//! Configuration file discovery and parsing.
//!
//! Loads `devext.config.json` from the project root. Plugin instances are
//! code, so the file only carries static settings plus a raw JSON section
//! per plugin that each plugin parses itself.
//!
//! ## Supported config format
//!
//! ```json
//! {
//!   "base": "/",
//!   "optimizeDeps": { "include": ["react"] },
//!   "plugins": { "externalize": { "externals": ["custom-logger"] } }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::plugin::{DevConfig, OptimizeDepsConfig};

/// Config file names in priority order.
const CONFIG_FILES: &[&str] = &["devext.config.json", ".devextrc.json"];

/// Configuration loaded from a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Base public path.
    pub base: Option<String>,
    /// Dependency optimization options.
    pub optimize_deps: OptimizeDepsFileConfig,
    /// Raw options keyed by plugin name.
    pub plugins: Map<String, Value>,
}

/// `optimizeDeps` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizeDepsFileConfig {
    /// Dependencies to pre-bundle even if the scanner never sees them.
    pub include: Vec<String>,
}

impl ConfigFile {
    /// Raw options for the plugin called `name`.
    pub fn plugin_options(&self, name: &str) -> Option<&Value> {
        self.plugins.get(name)
    }

    /// Build the user-facing dev config for `root`.
    pub fn to_dev_config(&self, root: impl Into<PathBuf>) -> DevConfig {
        let mut config = DevConfig::new(root);
        config.base.clone_from(&self.base);
        if !self.optimize_deps.include.is_empty() {
            config.optimize_deps = Some(OptimizeDepsConfig {
                include: self.optimize_deps.include.clone(),
                optimizer_options: None,
            });
        }
        config
    }
}

/// Find a config file in the given root directory.
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

/// Load configuration from a config file in the given root directory.
///
/// If `config_path` is `Some`, use that specific file. Otherwise, auto-discover.
pub fn load_config(root: &Path, config_path: Option<&Path>) -> Result<Option<(PathBuf, ConfigFile)>> {
    let path = match config_path {
        Some(p) => {
            let abs = if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            };
            if !abs.exists() {
                return Err(Error::other(format!(
                    "Config file not found: {}",
                    abs.display()
                )));
            }
            abs
        }
        None => match find_config_file(root) {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    let source = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let config = serde_json::from_str(&source).map_err(|source| Error::ConfigParse {
        path: path.clone(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(Some((path, config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_discovers_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("devext.config.json"),
            r#"{
  "base": "/app/",
  "optimizeDeps": { "include": ["react"] },
  "plugins": { "externalize": { "externals": ["custom-logger"] } }
}"#,
        )
        .unwrap();

        let (path, config) = load_config(dir.path(), None).unwrap().unwrap();
        assert!(path.ends_with("devext.config.json"));
        assert_eq!(config.base.as_deref(), Some("/app/"));
        assert_eq!(config.optimize_deps.include, vec!["react"]);
        assert_eq!(
            config.plugin_options("externalize").unwrap()["externals"][0],
            "custom-logger"
        );
    }

    #[test]
    fn test_load_config_without_file() {
        let dir = tempdir().unwrap();
        assert!(load_config(dir.path(), None).unwrap().is_none());
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = tempdir().unwrap();
        let err = load_config(dir.path(), Some(Path::new("missing.json"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("devext.config.json"), "{ base: }").unwrap();
        let err = load_config(dir.path(), None).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_to_dev_config() {
        let config = ConfigFile {
            base: Some("/app/".to_string()),
            optimize_deps: OptimizeDepsFileConfig {
                include: vec!["react".to_string()],
            },
            plugins: Map::new(),
        };
        let dev = config.to_dev_config("/project");
        assert_eq!(dev.base.as_deref(), Some("/app/"));
        assert_eq!(dev.optimize_deps.unwrap().include, vec!["react"]);

        let minimal = ConfigFile::default().to_dev_config("/project");
        assert!(minimal.optimize_deps.is_none());
    }
}
