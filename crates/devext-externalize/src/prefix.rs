//! Stripping the `<base>@id/` prefix from externalized imports.
//!
//! Import analysis rewrites every import it cannot serve from the project
//! into `<base>@id/<id>`. For externalized ids the browser must see the bare
//! specifier instead, so this transform runs after import analysis and undoes
//! the prefix for registry entries only.

use std::borrow::Cow;
use std::sync::{Arc, PoisonError, RwLock};

use devext_core::dev::ID_PREFIX;
use devext_core::{HookResult, Plugin, PluginContext, PluginError, TransformResult};
use regex_lite::Regex;

use crate::error::{Error, Result};
use crate::registry::ExternalRegistry;

/// Name of the prefix-strip plugin.
pub const PREFIX_PLUGIN_NAME: &str = "devext:remove-externals-prefix";

/// Rewrites `<base>@id/<id>` to `<id>` for every id in the registry.
pub struct PrefixStripper {
    base: String,
    registry: Arc<ExternalRegistry>,
    /// Compiled pattern and the registry size it was built from.
    cache: RwLock<Option<(usize, Arc<Regex>)>>,
}

impl PrefixStripper {
    pub fn new(base: impl Into<String>, registry: Arc<ExternalRegistry>) -> Self {
        Self {
            base: base.into(),
            registry,
            cache: RwLock::new(None),
        }
    }

    /// Strip the prefix in front of registry entries in `code`.
    ///
    /// Returns the input borrowed when nothing was rewritten. An entry is
    /// only stripped when the id ends there: with `foo` registered,
    /// `/@id/foo/sub` is rewritten and `/@id/foobar` is not.
    pub fn strip<'a>(&self, code: &'a str) -> Result<Cow<'a, str>> {
        if self.registry.is_empty() {
            return Ok(Cow::Borrowed(code));
        }
        if !code.contains(&format!("{}{ID_PREFIX}", self.base)) {
            return Ok(Cow::Borrowed(code));
        }

        let pattern = self.pattern()?;
        let mut result = String::new();
        let mut last = 0;

        for caps in pattern.captures_iter(code) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !ends_identifier(code[whole.end()..].chars().next()) {
                continue;
            }
            result.push_str(&code[last..whole.start()]);
            result.push_str(id.as_str());
            last = whole.end();
        }

        if last == 0 {
            return Ok(Cow::Borrowed(code));
        }
        result.push_str(&code[last..]);
        Ok(Cow::Owned(result))
    }

    /// Pattern for the current registry, rebuilt only when it grew.
    fn pattern(&self) -> Result<Arc<Regex>> {
        let entries = self.registry.len();
        if let Some((size, pattern)) = &*self.cache.read().unwrap_or_else(PoisonError::into_inner) {
            if *size == entries {
                return Ok(Arc::clone(pattern));
            }
        }

        let mut ids = self.registry.snapshot();
        // Longest first so `foo-bar` wins over `foo`.
        ids.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = ids
            .iter()
            .map(|id| regex_lite::escape(id))
            .collect::<Vec<_>>()
            .join("|");
        let source = format!(
            "{}{}({alternation})",
            regex_lite::escape(&self.base),
            regex_lite::escape(ID_PREFIX)
        );
        let pattern = Arc::new(Regex::new(&source).map_err(|source_err| Error::InvalidPattern {
            pattern: source.clone(),
            source: source_err,
        })?);

        tracing::debug!(entries = ids.len(), "rebuilt prefix pattern");
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) =
            Some((ids.len(), Arc::clone(&pattern)));
        Ok(pattern)
    }
}

/// `true` if `next` cannot continue a package name.
fn ends_identifier(next: Option<char>) -> bool {
    !next.is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '-'))
}

/// Dev plugin running [`PrefixStripper`] over every transformed module.
///
/// Appended to the resolved plugin list so it runs after import analysis.
pub struct RemovePrefixPlugin {
    stripper: PrefixStripper,
}

impl RemovePrefixPlugin {
    pub fn new(base: impl Into<String>, registry: Arc<ExternalRegistry>) -> Self {
        Self {
            stripper: PrefixStripper::new(base, registry),
        }
    }
}

impl Plugin for RemovePrefixPlugin {
    fn name(&self) -> &str {
        PREFIX_PLUGIN_NAME
    }

    fn transform(
        &self,
        code: &str,
        _id: &str,
        _ctx: &PluginContext,
    ) -> HookResult<Option<TransformResult>> {
        match self.stripper.strip(code) {
            Ok(Cow::Borrowed(_)) => Ok(None),
            Ok(Cow::Owned(code)) => Ok(Some(TransformResult::code(code))),
            Err(e) => Err(PluginError::new(PREFIX_PLUGIN_NAME, "transform", e.to_string())),
        }
    }
}
