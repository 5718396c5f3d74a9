//! Deciding whether a module id is external.

use std::fmt;
use std::sync::Arc;

use regex_lite::Regex;

/// Predicate signature accepted by [`ExternalCriterion::Predicate`].
pub type ExternalPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// One rule marking module ids as external.
#[derive(Clone)]
pub enum ExternalCriterion {
    /// Matches the package itself and any of its subpaths.
    Name(String),
    /// Matches when the pattern is found anywhere in the id.
    Pattern(Regex),
    /// Matches when the function returns `true`.
    Predicate(Arc<ExternalPredicate>),
}

impl ExternalCriterion {
    /// Build a predicate criterion.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Check whether `id` matches this criterion.
    ///
    /// `"foo"` matches `"foo"` and `"foo/bar"`, never `"foobar"`.
    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Name(name) => id
                .strip_prefix(name.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
            Self::Pattern(pattern) => pattern.is_match(id),
            Self::Predicate(predicate) => predicate(id),
        }
    }
}

impl fmt::Debug for ExternalCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for ExternalCriterion {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ExternalCriterion {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Regex> for ExternalCriterion {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

/// Returns `true` if any criterion matches `id`.
///
/// A panicking predicate unwinds through the caller.
pub fn is_external(id: &str, criteria: &[ExternalCriterion]) -> bool {
    criteria.iter().any(|criterion| criterion.matches(id))
}
