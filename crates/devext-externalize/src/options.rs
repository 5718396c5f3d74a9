//! Plugin options, from code or from the `plugins.externalize` section of
//! `devext.config.json`.
//!
//! ```json
//! { "plugins": { "externalize": { "externals": ["custom-logger", { "pattern": "^@acme/" }] } } }
//! ```

use std::sync::Arc;

use devext_core::dev::ConfigFile;
use regex_lite::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::matcher::ExternalCriterion;

/// Key of this plugin's section in the config file.
pub const CONFIG_SECTION: &str = "externalize";

/// Options for [`crate::externalize`].
#[derive(Debug, Clone, Default)]
pub struct ExternalizeOptions {
    externals: Vec<ExternalCriterion>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    #[serde(default)]
    externals: Vec<RawCriterion>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCriterion {
    Name(String),
    Pattern { pattern: String },
}

impl ExternalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with one name criterion per entry.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            externals: names
                .into_iter()
                .map(|name| ExternalCriterion::Name(name.into()))
                .collect(),
        }
    }

    /// Add any criterion.
    pub fn external(mut self, criterion: impl Into<ExternalCriterion>) -> Self {
        self.externals.push(criterion.into());
        self
    }

    /// Add a pattern criterion from source text.
    pub fn pattern(self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self.external(regex))
    }

    /// Add a predicate criterion.
    pub fn predicate<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.external(ExternalCriterion::predicate(f))
    }

    /// Parse options from a JSON value.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let raw = RawOptions::deserialize(value)?;
        raw.externals
            .into_iter()
            .try_fold(Self::new(), |options, criterion| match criterion {
                RawCriterion::Name(name) => Ok(options.external(name)),
                RawCriterion::Pattern { pattern } => options.pattern(&pattern),
            })
    }

    /// Read the `externalize` section of a loaded config file.
    ///
    /// Returns `None` when the file has no such section.
    pub fn from_config_file(config: &ConfigFile) -> Result<Option<Self>> {
        config
            .plugin_options(CONFIG_SECTION)
            .map(Self::from_json)
            .transpose()
    }

    pub fn externals(&self) -> &[ExternalCriterion] {
        &self.externals
    }

    pub(crate) fn into_shared(self) -> Arc<[ExternalCriterion]> {
        self.externals.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::is_external;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let options = ExternalizeOptions::with_names(["custom-logger"])
            .pattern("^@acme/")
            .unwrap()
            .predicate(|id| id == "magic");

        let externals = options.externals();
        assert_eq!(externals.len(), 3);
        assert!(is_external("custom-logger/x", externals));
        assert!(is_external("@acme/ui", externals));
        assert!(is_external("magic", externals));
        assert!(!is_external("react", externals));
    }

    #[test]
    fn test_from_json() {
        let options = ExternalizeOptions::from_json(&json!({
            "externals": ["custom-logger", { "pattern": "^@acme/" }]
        }))
        .unwrap();

        assert!(matches!(&options.externals()[0], ExternalCriterion::Name(name) if name == "custom-logger"));
        assert!(matches!(&options.externals()[1], ExternalCriterion::Pattern(re) if re.as_str() == "^@acme/"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ExternalizeOptions::from_json(&json!({ "externals": [{ "pattern": "(" }] }))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_invalid_shape() {
        let err = ExternalizeOptions::from_json(&json!({ "externals": [42] })).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));

        let err = ExternalizeOptions::from_json(&json!({ "exclude": [] })).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn test_from_config_file() {
        let config: ConfigFile = serde_json::from_value(json!({
            "plugins": { "externalize": { "externals": ["custom-logger"] } }
        }))
        .unwrap();
        let options = ExternalizeOptions::from_config_file(&config).unwrap().unwrap();
        assert_eq!(options.externals().len(), 1);

        assert!(ExternalizeOptions::from_config_file(&ConfigFile::default())
            .unwrap()
            .is_none());
    }
}
