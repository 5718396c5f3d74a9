//! Import analysis for unbundled dev serving.
//!
//! Scans transformed JavaScript for import/export statements and rewrites:
//! - Relative imports (`./App.js`) → `<base>src/App.js` (resolved from project root)
//! - Ids a plugin resolved as external → `<base>@id/<id>`
//! - Installed bare packages (`react`) → `<base>@modules/react` (pre-bundled)
//!
//! Anything else is an unresolved import and fails the request.

use std::path::{Path, PathBuf};

use crate::dev::prebundle::{is_bare_specifier, resolve_package_entry};
use crate::error::Error;
use crate::plugin::{
    HookResult, Plugin, PluginContext, PluginError, ResolveIdResult, SharedPlugin, TransformResult,
};

/// Name of the builtin import analysis plugin.
pub const IMPORT_ANALYSIS_PLUGIN: &str = "devext:import-analysis";

/// Prefix (after `base`) marking an id that is not a project file.
pub const ID_PREFIX: &str = "@id/";

/// Prefix (after `base`) of pre-bundled dependencies.
pub const MODULES_PREFIX: &str = "@modules/";

/// Builtin plugin rewriting import specifiers into browser-requestable URLs.
///
/// Always the last builtin in the resolved plugin list. Plugins that need to
/// see its output must be appended from `config_resolved`.
pub struct ImportAnalysisPlugin {
    /// Project root directory.
    root: PathBuf,
    /// Normalized base public path.
    base: String,
    /// Plugins consulted through `resolve_id` for non-relative specifiers.
    resolvers: Vec<SharedPlugin>,
}

impl ImportAnalysisPlugin {
    #[must_use]
    pub fn new(root: PathBuf, base: String, resolvers: Vec<SharedPlugin>) -> Self {
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            base,
            resolvers,
        }
    }

    /// Rewrite imports in JavaScript source code.
    ///
    /// `importer` is the id (absolute path) of the module being served.
    pub fn rewrite(&self, code: &str, importer: &str, ctx: &PluginContext) -> HookResult<String> {
        let mut result = String::with_capacity(code.len());
        let module_dir = Path::new(importer).parent().unwrap_or(Path::new("/"));

        for line in code.lines() {
            let trimmed = line.trim();

            if is_import_line(trimmed) || is_export_from_line(trimmed) {
                result.push_str(&self.rewrite_import_line(line, module_dir, importer, ctx)?);
            } else if trimmed.contains("import(") {
                result.push_str(&self.rewrite_dynamic_import_line(line, module_dir, importer, ctx)?);
            } else {
                result.push_str(line);
            }
            result.push('\n');
        }

        // Remove trailing newline if original didn't have one
        if !code.ends_with('\n') && result.ends_with('\n') {
            result.pop();
        }

        Ok(result)
    }

    /// Rewrite a single static import/export line.
    fn rewrite_import_line(
        &self,
        line: &str,
        module_dir: &Path,
        importer: &str,
        ctx: &PluginContext,
    ) -> HookResult<String> {
        if let Some((before, specifier, after, quote)) = extract_from_specifier(line) {
            let rewritten = self.rewrite_specifier(&specifier, module_dir, importer, ctx)?;
            Ok(format!("{before}{quote}{rewritten}{quote}{after}"))
        } else if let Some((before, specifier, after, quote)) = extract_side_effect_import(line) {
            // Side-effect import: import 'xxx'
            let rewritten = self.rewrite_specifier(&specifier, module_dir, importer, ctx)?;
            Ok(format!("{before}{quote}{rewritten}{quote}{after}"))
        } else {
            Ok(line.to_string())
        }
    }

    /// Rewrite dynamic `import()` expressions in a line.
    fn rewrite_dynamic_import_line(
        &self,
        line: &str,
        module_dir: &Path,
        importer: &str,
        ctx: &PluginContext,
    ) -> HookResult<String> {
        let mut result = String::with_capacity(line.len());
        let mut remaining = line;

        while let Some(import_start) = remaining.find("import(") {
            result.push_str(&remaining[..import_start]);
            let after_import = &remaining[import_start + 7..];

            if let Some((specifier, quote, rest)) = extract_string_from_start(after_import) {
                let rewritten = self.rewrite_specifier(&specifier, module_dir, importer, ctx)?;
                result.push_str("import(");
                result.push(quote);
                result.push_str(&rewritten);
                result.push(quote);
                remaining = rest;
            } else {
                // Not a string literal, leave as-is
                result.push_str("import(");
                remaining = after_import;
            }
        }

        result.push_str(remaining);
        Ok(result)
    }

    /// Rewrite a single import specifier.
    fn rewrite_specifier(
        &self,
        specifier: &str,
        module_dir: &Path,
        importer: &str,
        ctx: &PluginContext,
    ) -> HookResult<String> {
        // Virtual modules, absolute URLs and already rewritten ids stay as-is
        if specifier.starts_with('\0')
            || specifier.starts_with('/')
            || specifier.starts_with("http://")
            || specifier.starts_with("https://")
            || specifier.starts_with("data:")
        {
            return Ok(specifier.to_string());
        }

        if specifier.starts_with("./") || specifier.starts_with("../") {
            return Ok(self.resolve_to_root_path(specifier, module_dir));
        }

        if let Some(resolved) = self.resolve_with_plugins(specifier, importer, ctx)? {
            if resolved.external {
                return Ok(self.wrap_id(&resolved.id));
            }
            let resolved_path = PathBuf::from(&resolved.id);
            if let Ok(rel) = resolved_path.strip_prefix(&self.root) {
                return Ok(format!("{}{}", self.base, to_url_path(rel)));
            }
            return Ok(self.wrap_id(&resolved.id));
        }

        if is_bare_specifier(specifier) && resolve_package_entry(&self.root, specifier).is_some() {
            return Ok(format!("{}{MODULES_PREFIX}{specifier}", self.base));
        }

        Err(PluginError::new(
            IMPORT_ANALYSIS_PLUGIN,
            "transform",
            Error::UnresolvedImport {
                specifier: specifier.to_string(),
                importer: self.display_importer(importer),
            }
            .to_string(),
        ))
    }

    fn resolve_with_plugins(
        &self,
        specifier: &str,
        importer: &str,
        ctx: &PluginContext,
    ) -> HookResult<Option<ResolveIdResult>> {
        for plugin in &self.resolvers {
            if let Some(result) = plugin.resolve_id(specifier, Some(importer), ctx)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// `<base>@id/<id>`: the URL the browser requests for a non-file id.
    fn wrap_id(&self, id: &str) -> String {
        format!("{}{ID_PREFIX}{id}", self.base)
    }

    /// Resolve a relative import to a base-prefixed path from the project root.
    ///
    /// E.g., `./App` from `/project/src/main.js` → `/src/App.js`
    fn resolve_to_root_path(&self, specifier: &str, module_dir: &Path) -> String {
        let resolved = module_dir.join(specifier);

        // Try to canonicalize, falling back to the joined path
        let absolute = resolved.canonicalize().unwrap_or(resolved);

        if let Ok(relative) = absolute.strip_prefix(&self.root) {
            if !has_js_extension(&relative.to_string_lossy()) {
                for ext in &[".js", ".mjs", ".jsx", ".ts", ".tsx"] {
                    let with_ext = PathBuf::from(format!("{}{ext}", absolute.display()));
                    if with_ext.is_file() {
                        if let Ok(rel) = with_ext.strip_prefix(&self.root) {
                            return format!("{}{}", self.base, to_url_path(rel));
                        }
                    }
                }
                for index in &["index.js", "index.mjs", "index.ts"] {
                    let index_path = absolute.join(index);
                    if index_path.is_file() {
                        if let Ok(rel) = index_path.strip_prefix(&self.root) {
                            return format!("{}{}", self.base, to_url_path(rel));
                        }
                    }
                }
            }
            return format!("{}{}", self.base, to_url_path(relative));
        }

        // Fallback: return the specifier as-is
        specifier.to_string()
    }

    fn display_importer(&self, importer: &str) -> String {
        Path::new(importer)
            .strip_prefix(&self.root)
            .map_or_else(|_| importer.to_string(), |rel| format!("/{}", to_url_path(rel)))
    }
}

impl Plugin for ImportAnalysisPlugin {
    fn name(&self) -> &str {
        IMPORT_ANALYSIS_PLUGIN
    }

    fn transform(
        &self,
        code: &str,
        id: &str,
        ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        if !is_script_id(id) {
            return Ok(None);
        }
        let rewritten = self.rewrite(code, id, ctx)?;
        if rewritten == code {
            Ok(None)
        } else {
            Ok(Some(TransformResult::code(rewritten)))
        }
    }
}

/// Path relative to the root, with forward slashes and no leading slash.
fn to_url_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Ids without a file extension (plugin ids) are scripts too.
fn is_script_id(id: &str) -> bool {
    let ext = Path::new(id)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("js");
    matches!(ext, "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "mts")
}

/// Check if a line is a static import statement.
fn is_import_line(trimmed: &str) -> bool {
    trimmed.starts_with("import ")
        && (trimmed.contains(" from ") || trimmed.contains('\'') || trimmed.contains('"'))
}

/// Check if a line is an `export ... from` re-export.
fn is_export_from_line(trimmed: &str) -> bool {
    trimmed.starts_with("export ") && trimmed.contains(" from ")
}

/// Check if a path has a script or JSON extension.
fn has_js_extension(path: &str) -> bool {
    let lower = path.to_lowercase();
    [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs", ".json"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Extract the `from 'specifier'` portion of an import/export line.
///
/// Returns (`before_quote`, specifier, `after_quote`, `quote_char`).
pub(crate) fn extract_from_specifier(line: &str) -> Option<(String, String, String, char)> {
    let from_idx = line.find(" from ")?;
    let after_from = &line[from_idx + 6..];
    let after_from_trimmed = after_from.trim_start();
    let quote = after_from_trimmed.chars().next()?;

    if quote != '\'' && quote != '"' {
        return None;
    }

    let inner = &after_from_trimmed[1..];
    let end_idx = inner.find(quote)?;
    let specifier = inner[..end_idx].to_string();

    let before = format!("{} from ", &line[..from_idx]);
    let after_specifier = &inner[end_idx + 1..];

    Some((before, specifier, after_specifier.to_string(), quote))
}

/// Extract specifier from a side-effect import: `import 'xxx'` or `import "xxx"`.
pub(crate) fn extract_side_effect_import(line: &str) -> Option<(String, String, String, char)> {
    let trimmed = line.trim();
    if !trimmed.starts_with("import ") {
        return None;
    }

    let after_import = &trimmed[7..].trim_start();
    let quote = after_import.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let inner = &after_import[1..];
    let end_idx = inner.find(quote)?;
    let specifier = inner[..end_idx].to_string();
    let after = inner[end_idx + 1..].to_string();

    // Preserve leading whitespace from original line
    let leading_ws: String = line.chars().take_while(|c| c.is_whitespace()).collect();
    let before = format!("{leading_ws}import ");

    Some((before, specifier, after, quote))
}

/// Extract a string literal from the start of a string slice.
///
/// Returns (specifier, `quote_char`, `rest_of_string`).
pub(crate) fn extract_string_from_start(s: &str) -> Option<(String, char, &str)> {
    let trimmed = s.trim_start();
    let quote = trimmed.chars().next()?;

    if quote != '\'' && quote != '"' {
        return None;
    }

    let inner = &trimmed[1..];
    let end_idx = inner.find(quote)?;
    let specifier = inner[..end_idx].to_string();
    let rest = &inner[end_idx + 1..];

    Some((specifier, quote, rest))
}
