//! Per-request module transformation pipeline for unbundled dev serving.
//!
//! Handles: resolve → load → plugin transform (import analysis included).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::dev::rewrite::ID_PREFIX;
use crate::error::{Error, Result};
use crate::plugin::PluginContainer;

/// Cached transform result for a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedModule {
    /// The transformed source code (ready to serve).
    pub code: String,
    /// Content-Type to serve with.
    pub content_type: &'static str,
    /// The resolved module id (a file path for project files).
    pub file_path: String,
}

/// Per-request module transformation pipeline.
///
/// Caches transformed modules and invalidates on file change.
pub struct ModuleTransformer {
    /// Project root.
    root: PathBuf,
    /// Normalized base public path.
    base: String,
    /// Module cache: url → `TransformedModule`.
    cache: RwLock<FxHashMap<String, TransformedModule>>,
}

impl ModuleTransformer {
    /// Create a new module transformer.
    pub fn new(root: PathBuf, base: String) -> Self {
        Self {
            root,
            base,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Transform a module for serving.
    ///
    /// Runs the full pipeline: resolve → load → transform.
    /// Results are cached until invalidated.
    pub fn transform_module(&self, url: &str, plugins: &PluginContainer) -> Result<TransformedModule> {
        if let Some(cached) = self.get_cached(url) {
            return Ok(cached);
        }

        let (id, external) = self.resolve_url(url, plugins)?;
        let source = self.load_module(&id, url, plugins)?;

        // External ids are package names; a dot in one is not an extension.
        let ext = if external {
            "js"
        } else {
            Path::new(&id)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("js")
        };

        let code = match ext {
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "mts" => plugins.transform(&source, &id)?,
            "json" => {
                let json_module = format!("export default {};", source.trim());
                plugins.transform(&json_module, &id)?
            }
            _ => {
                return Err(Error::other(format!("Unsupported file type: .{ext} ({id})")));
            }
        };

        let module = TransformedModule {
            code,
            content_type: "application/javascript",
            file_path: id,
        };

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), module.clone());

        Ok(module)
    }

    /// Invalidate cache for a changed file.
    ///
    /// Returns the list of URLs that were invalidated.
    pub fn invalidate(&self, file_path: &str) -> Vec<String> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let mut invalidated = Vec::new();

        cache.retain(|url, module| {
            if module.file_path == file_path {
                invalidated.push(url.clone());
                false
            } else {
                true
            }
        });

        invalidated
    }

    fn get_cached(&self, url: &str) -> Option<TransformedModule> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Resolve a request URL to a module id and whether a plugin marked it
    /// external.
    ///
    /// `<base>@id/<id>` URLs carry a plugin id verbatim; anything else is a
    /// path below the project root.
    fn resolve_url(&self, url: &str, plugins: &PluginContainer) -> Result<(String, bool)> {
        let id_prefix = format!("{}{ID_PREFIX}", self.base);
        if let Some(id) = url.strip_prefix(&id_prefix) {
            return Ok(plugins.resolve_id(id, None)?.map_or_else(
                || (id.to_string(), false),
                |resolved| (resolved.id, resolved.external),
            ));
        }

        if let Some(resolved) = plugins.resolve_id(url, None)? {
            if resolved.external || Path::new(&resolved.id).is_file() {
                return Ok((resolved.id, resolved.external));
            }
        }

        // URL is base-relative: <base>src/App.js → {root}/src/App.js
        let stripped = url
            .strip_prefix(self.base.as_str())
            .or_else(|| url.strip_prefix('/'))
            .unwrap_or(url);
        let file_path = self.root.join(stripped);

        if file_path.is_file() {
            return Ok((file_path.display().to_string(), false));
        }

        for ext in &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"] {
            let with_ext = PathBuf::from(format!("{}{ext}", file_path.display()));
            if with_ext.is_file() {
                return Ok((with_ext.display().to_string(), false));
            }
        }

        for index in &["index.ts", "index.tsx", "index.js", "index.jsx"] {
            let index_path = file_path.join(index);
            if index_path.is_file() {
                return Ok((index_path.display().to_string(), false));
            }
        }

        Err(Error::ModuleNotFound(url.to_string()))
    }

    /// Load module source through plugins, then the file system.
    fn load_module(&self, id: &str, url: &str, plugins: &PluginContainer) -> Result<String> {
        if let Some(loaded) = plugins.load(id)? {
            return Ok(loaded.code);
        }

        let path = Path::new(id);
        if path.is_absolute() && path.is_file() {
            return Ok(fs::read_to_string(path)?);
        }

        Err(Error::ModuleNotFound(url.to_string()))
    }
}
