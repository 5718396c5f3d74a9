//! Dependency pre-bundling for dev serving.
//!
//! Scans entry points for bare imports (node_modules packages) and bundles
//! each dependency into `.devext/deps/` so the browser doesn't need to make
//! hundreds of requests for individual node_modules files.
//!
//! Every resolve and load goes through the optimizer plugins first, which is
//! how a plugin keeps an import out of the optimized output. A run whose
//! inputs hash to the value stored in `_metadata.json` reuses the previous
//! output without touching the plugins at all.
//!
//! Pre-bundled deps are served at `/@modules/{pkg}` URLs.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::dev::rewrite::{extract_from_specifier, extract_side_effect_import, extract_string_from_start};
use crate::error::{Error, Result};
use crate::optimizer::{
    OnLoadArgs, OnResolveArgs, OnResolveResult, PluginBuild, ResolveKind, SharedOptimizerPlugin,
    FILE_NAMESPACE,
};
use crate::plugin::OptimizeDepsConfig;

/// Metadata file written next to the optimized deps.
const METADATA_FILE: &str = "_metadata.json";

/// Lockfiles folded into the cache hash.
const LOCKFILES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

/// Pre-bundled dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreBundledDep {
    /// Package name (e.g., "react", "@scope/pkg").
    pub name: String,
    /// Path to the pre-bundled file.
    pub output_path: PathBuf,
    /// Bundled source code (cached in memory for fast serving).
    pub code: String,
    /// Imports an optimizer plugin kept out of this dependency.
    pub externals: Vec<String>,
}

/// What a call to [`PreBundler::run`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeOutcome {
    /// Dependencies were (re)bundled through the optimizer plugins.
    Optimized(Vec<String>),
    /// The previous output matched the current inputs and was reused.
    Cached(Vec<String>),
    /// Nothing to optimize.
    Skipped,
}

#[derive(Debug, Serialize, Deserialize)]
struct DepsMetadata {
    hash: String,
    deps: Vec<DepMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DepMetadata {
    name: String,
    file: String,
    #[serde(default)]
    externals: Vec<String>,
}

/// Dependency pre-bundler.
///
/// Scans project source for bare imports and pre-bundles each npm dependency
/// into a single ESM file for efficient browser loading.
pub struct PreBundler {
    /// Project root directory.
    root: PathBuf,
    /// Output directory for pre-bundled deps.
    deps_dir: PathBuf,
    /// Dependencies bundled even if no entry imports them.
    include: Vec<String>,
    /// Optimizer plugins, set up lazily on a cache miss.
    plugins: Vec<SharedOptimizerPlugin>,
    /// Pre-bundled deps cache: package name → `PreBundledDep`.
    deps: FxHashMap<String, PreBundledDep>,
}

impl PreBundler {
    /// Create a new pre-bundler for the resolved `optimize_deps` section.
    pub fn new(root: PathBuf, config: &OptimizeDepsConfig) -> Self {
        let deps_dir = root.join(".devext").join("deps");
        let plugins = config
            .optimizer_options
            .as_ref()
            .and_then(|options| options.plugins.clone())
            .unwrap_or_default();
        Self {
            root,
            deps_dir,
            include: config.include.clone(),
            plugins,
            deps: FxHashMap::default(),
        }
    }

    /// Directory holding the optimized output.
    pub fn deps_dir(&self) -> &Path {
        &self.deps_dir
    }

    /// Optimize the dependencies reachable from `entries` plus `include`.
    ///
    /// Reuses the previous output when nothing that feeds the optimizer
    /// changed; in that case no optimizer plugin is set up or called.
    pub fn run(&mut self, entries: &[PathBuf]) -> Result<OptimizeOutcome> {
        let hash = self.inputs_hash(entries);

        if let Some(names) = self.load_cached(&hash) {
            tracing::info!(deps = names.len(), "reusing optimized dependencies");
            return Ok(OptimizeOutcome::Cached(names));
        }

        let build = PluginBuild::setup(&self.plugins)?;

        let mut packages: Vec<String> = Vec::new();
        for name in &self.include {
            if !packages.contains(name) {
                packages.push(name.clone());
            }
        }
        for entry in entries {
            for name in self.scan_file_recursive(entry, &build)? {
                if !packages.contains(&name) {
                    packages.push(name);
                }
            }
        }

        if packages.is_empty() {
            return Ok(OptimizeOutcome::Skipped);
        }

        let names = self.bundle_deps(&packages, &build)?;
        self.write_metadata(&hash)?;
        tracing::info!(deps = names.len(), "optimized dependencies");
        Ok(OptimizeOutcome::Optimized(names))
    }

    /// Scan entry source code for import specifiers, in source order, each
    /// with the kind of import that names it.
    pub fn scan_imports(source: &str) -> Vec<(String, ResolveKind)> {
        let mut specifiers = Vec::new();

        for line in source.lines() {
            let trimmed = line.trim();

            // Static imports and re-exports
            if trimmed.starts_with("import ") || trimmed.starts_with("export ") {
                if let Some((_, specifier, _, _)) = extract_from_specifier(trimmed)
                    .or_else(|| extract_side_effect_import(trimmed))
                {
                    specifiers.push((specifier, ResolveKind::ImportStatement));
                }
            }

            // Dynamic imports
            if let Some(start) = trimmed.find("import(") {
                if let Some((specifier, _, _)) = extract_string_from_start(&trimmed[start + 7..]) {
                    specifiers.push((specifier, ResolveKind::DynamicImport));
                }
            }
        }

        specifiers
    }

    /// Scan a file and all its relative imports for bare dependencies.
    ///
    /// Each import is resolved through the optimizer plugins first; imports
    /// a plugin marks external are not dependencies.
    fn scan_file_recursive(&self, entry: &Path, build: &PluginBuild) -> Result<Vec<String>> {
        let mut packages = Vec::new();
        let mut visited = FxHashSet::default();
        let mut queue = vec![entry.to_path_buf()];

        while let Some(path) = queue.pop() {
            if !visited.insert(path.clone()) {
                continue;
            }
            let Ok(source) = fs::read_to_string(&path) else {
                continue;
            };
            let importer = path.display().to_string();

            for (specifier, kind) in Self::scan_imports(&source) {
                let resolved = build.resolve(&OnResolveArgs {
                    path: &specifier,
                    importer: &importer,
                    namespace: FILE_NAMESPACE,
                    kind,
                })?;
                if resolved.as_ref().is_some_and(|r| r.external) {
                    continue;
                }

                if specifier.starts_with("./") || specifier.starts_with("../") {
                    if let Some(file) = path.parent().and_then(|dir| resolve_file(&dir.join(&specifier))) {
                        queue.push(file);
                    }
                } else if is_bare_specifier(&specifier) {
                    let pkg = package_name_from_specifier(&specifier);
                    if !packages.contains(&pkg) {
                        packages.push(pkg);
                    }
                }
            }
        }

        Ok(packages)
    }

    /// Pre-bundle all discovered dependencies.
    ///
    /// Creates `.devext/deps/{pkg}.js` files and populates the in-memory cache.
    /// A package missing from `node_modules` is skipped with a warning;
    /// any other failure aborts the run.
    fn bundle_deps(&mut self, packages: &[String], build: &PluginBuild) -> Result<Vec<String>> {
        fs::create_dir_all(&self.deps_dir)?;
        self.deps.clear();

        let mut names = Vec::with_capacity(packages.len());
        for pkg in packages {
            match self.bundle_single_dep(pkg, build) {
                Ok(dep) => {
                    names.push(pkg.clone());
                    self.deps.insert(pkg.clone(), dep);
                }
                Err(Error::ModuleNotFound(message)) => {
                    tracing::warn!(package = %pkg, %message, "failed to pre-bundle dependency");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(names)
    }

    /// Bundle a single dependency.
    fn bundle_single_dep(&self, pkg: &str, build: &PluginBuild) -> Result<PreBundledDep> {
        let resolved = build.resolve(&OnResolveArgs {
            path: pkg,
            importer: "",
            namespace: FILE_NAMESPACE,
            kind: ResolveKind::EntryPoint,
        })?;

        let (code, entry_path) = match resolved {
            Some(OnResolveResult { external: true, .. }) => {
                return Err(Error::ExternalEntryPoint(pkg.to_string()));
            }
            Some(OnResolveResult {
                path,
                namespace: Some(namespace),
                ..
            }) if namespace != FILE_NAMESPACE => {
                let path = path.unwrap_or_else(|| pkg.to_string());
                let loaded = build.load(&OnLoadArgs {
                    path: &path,
                    namespace: &namespace,
                })?;
                let Some(loaded) = loaded else {
                    return Err(Error::NoLoader { namespace, path });
                };
                (loaded.contents, None)
            }
            Some(OnResolveResult { path: Some(path), .. }) => {
                let file = PathBuf::from(path);
                (self.load_file(&file, build)?, Some(file))
            }
            _ => {
                let Some(file) = resolve_package_entry(&self.root, pkg) else {
                    return Err(Error::ModuleNotFound(format!(
                        "Package not found in node_modules: {pkg}"
                    )));
                };
                (self.load_file(&file, build)?, Some(file))
            }
        };

        let externals = match &entry_path {
            Some(file) => collect_externals(&code, file, build)?,
            None => Vec::new(),
        };

        let output_path = self.deps_dir.join(format!("{}.js", sanitize_pkg_name(pkg)));
        atomic_write(&output_path, code.as_bytes())?;

        Ok(PreBundledDep {
            name: pkg.to_string(),
            output_path,
            code,
            externals,
        })
    }

    /// Read a file-namespace module, giving `on_load` callbacks the first say.
    fn load_file(&self, file: &Path, build: &PluginBuild) -> Result<String> {
        let path = file.display().to_string();
        if let Some(loaded) = build.load(&OnLoadArgs {
            path: &path,
            namespace: FILE_NAMESPACE,
        })? {
            return Ok(loaded.contents);
        }
        fs::read_to_string(file).map_err(|e| {
            Error::ModuleNotFound(format!("Failed to read {}: {e}", file.display()))
        })
    }

    fn inputs_hash(&self, entries: &[PathBuf]) -> String {
        let mut hasher = blake3::Hasher::new();
        for plugin in &self.plugins {
            hasher.update(b"plugin:");
            hasher.update(plugin.name().as_bytes());
            hasher.update(b"\n");
        }
        for name in &self.include {
            hasher.update(b"include:");
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        for entry in entries {
            hasher.update(b"entry:");
            hasher.update(entry.to_string_lossy().as_bytes());
            hasher.update(b"\n");
        }
        for lockfile in LOCKFILES {
            if let Ok(bytes) = fs::read(self.root.join(lockfile)) {
                hasher.update(&bytes);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Populate the cache from disk if the stored hash matches.
    fn load_cached(&mut self, hash: &str) -> Option<Vec<String>> {
        let source = fs::read_to_string(self.deps_dir.join(METADATA_FILE)).ok()?;
        let metadata: DepsMetadata = serde_json::from_str(&source).ok()?;
        if metadata.hash != hash {
            return None;
        }

        let mut deps = FxHashMap::default();
        let mut names = Vec::with_capacity(metadata.deps.len());
        for dep in metadata.deps {
            let output_path = self.deps_dir.join(&dep.file);
            let code = fs::read_to_string(&output_path).ok()?;
            names.push(dep.name.clone());
            deps.insert(
                dep.name.clone(),
                PreBundledDep {
                    name: dep.name,
                    output_path,
                    code,
                    externals: dep.externals,
                },
            );
        }

        self.deps = deps;
        Some(names)
    }

    fn write_metadata(&self, hash: &str) -> Result<()> {
        let mut deps: Vec<DepMetadata> = self
            .deps
            .values()
            .map(|dep| DepMetadata {
                name: dep.name.clone(),
                file: format!("{}.js", sanitize_pkg_name(&dep.name)),
                externals: dep.externals.clone(),
            })
            .collect();
        deps.sort_by(|a, b| a.name.cmp(&b.name));

        let metadata = DepsMetadata {
            hash: hash.to_string(),
            deps,
        };
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| Error::other(format!("Failed to serialize deps metadata: {e}")))?;
        atomic_write(&self.deps_dir.join(METADATA_FILE), &json)?;
        Ok(())
    }

    /// Get a pre-bundled dependency by package name.
    pub fn get(&self, pkg: &str) -> Option<&PreBundledDep> {
        self.deps.get(pkg)
    }

    /// Check if a package has been pre-bundled.
    pub fn has(&self, pkg: &str) -> bool {
        self.deps.contains_key(pkg)
    }
}

/// Imports of an optimized module that the plugins marked external.
fn collect_externals(code: &str, importer: &Path, build: &PluginBuild) -> Result<Vec<String>> {
    let importer = importer.display().to_string();
    let mut externals = Vec::new();
    for (specifier, kind) in PreBundler::scan_imports(code) {
        let resolved = build.resolve(&OnResolveArgs {
            path: &specifier,
            importer: &importer,
            namespace: FILE_NAMESPACE,
            kind,
        })?;
        if resolved.is_some_and(|r| r.external) && !externals.contains(&specifier) {
            externals.push(specifier);
        }
    }
    Ok(externals)
}

/// Try a path as-is, with common extensions, then as a directory index.
fn resolve_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    for ext in &[".ts", ".tsx", ".js", ".jsx", ".mjs"] {
        let with_ext = PathBuf::from(format!("{}{ext}", base.display()));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    ["index.js", "index.mjs", "index.ts"]
        .iter()
        .map(|index| base.join(index))
        .find(|path| path.is_file())
}

/// Locate the entry file of an installed package (or package subpath).
///
/// Uses `module`, then `main` from `package.json`, then `index.js`.
pub(crate) fn resolve_package_entry(root: &Path, specifier: &str) -> Option<PathBuf> {
    let pkg = package_name_from_specifier(specifier);
    let pkg_dir = root.join("node_modules").join(&pkg);
    if !pkg_dir.is_dir() {
        return None;
    }

    if specifier.len() > pkg.len() {
        return resolve_file(&pkg_dir.join(&specifier[pkg.len() + 1..]));
    }

    let manifest = fs::read_to_string(pkg_dir.join("package.json"))
        .ok()
        .and_then(|source| serde_json::from_str::<serde_json::Value>(&source).ok());
    if let Some(manifest) = manifest {
        for field in ["module", "main"] {
            if let Some(entry) = manifest.get(field).and_then(|v| v.as_str()) {
                if let Some(file) = resolve_file(&pkg_dir.join(entry)) {
                    return Some(file);
                }
            }
        }
    }

    resolve_file(&pkg_dir.join("index"))
}

/// Check if a specifier is a bare import (not relative, not absolute).
pub(crate) fn is_bare_specifier(specifier: &str) -> bool {
    !specifier.is_empty()
        && !specifier.starts_with('.')
        && !specifier.starts_with('/')
        && !specifier.starts_with('\0')
        && !specifier.starts_with("node:")
        && !specifier.starts_with("data:")
        && !specifier.contains("://")
}

/// Get the package name from a specifier (handles subpaths and scoped packages).
pub(crate) fn package_name_from_specifier(specifier: &str) -> String {
    if specifier.starts_with('@') {
        // Scoped: @scope/pkg or @scope/pkg/subpath
        let parts: Vec<&str> = specifier.splitn(3, '/').collect();
        if parts.len() >= 2 {
            format!("{}/{}", parts[0], parts[1])
        } else {
            specifier.to_string()
        }
    } else {
        // Regular: pkg or pkg/subpath
        specifier.split('/').next().unwrap_or(specifier).to_string()
    }
}

/// Sanitize a package name for use as a filename.
fn sanitize_pkg_name(pkg: &str) -> String {
    pkg.replace('/', "__").replace('@', "")
}

/// Write to a temp file in the same directory, then rename over `path`.
fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        e
    })
}
