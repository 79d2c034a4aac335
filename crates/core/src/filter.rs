//! Header filters used to pick one consumer among several sharing a path
//!
//! A filter is satisfied when the named header is present and one of its
//! values equals the match string, or, failing that, fully matches the match
//! string read as a regular expression. The exact comparison always runs
//! first so plain values such as `CE1` never depend on regex semantics.

use http::HeaderMap;
use regex::Regex;
use std::fmt;

/// A single `(header, value)` predicate
#[derive(Clone)]
pub struct Filter {
    header: String,
    value: String,
    pattern: Option<Regex>,
}

impl Filter {
    /// Create a filter; a value that is not a valid regex only matches exactly
    pub fn new(header: impl Into<String>, value: impl Into<String>) -> Self {
        let header = header.into().to_ascii_lowercase();
        let value = value.into();
        // An unbalanced value must not close the group and escape the anchors
        let pattern = match Regex::new(&value)
            .and_then(|_| Regex::new(&format!("^(?:{})$", value)))
        {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::debug!(
                    header = %header,
                    value = %value,
                    "Filter value is not a valid regex, using exact match only: {}",
                    e
                );
                None
            }
        };

        Self {
            header,
            value,
            pattern,
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether `candidate` satisfies the match value
    pub fn matches_value(&self, candidate: &str) -> bool {
        candidate == self.value
            || self
                .pattern
                .as_ref()
                .map(|re| re.is_match(candidate))
                .unwrap_or(false)
    }

    /// Whether any value of the filtered header satisfies the match value
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(self.header.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| self.matches_value(v))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("header", &self.header)
            .field("value", &self.value)
            .field("regex", &self.pattern.is_some())
            .finish()
    }
}

/// Whether every filter is satisfied; an empty set matches everything
pub fn matches(filters: &[Filter], headers: &HeaderMap) -> bool {
    filters.iter().all(|f| f.matches(headers))
}
