//! Target-site pattern matching.
//!
//! A mod's `target_sites` decide which pages it is injected into:
//! - empty, or containing `*`: every URL
//! - an entry containing `*`: a regular expression with each `*` replaced by `.*`,
//!   searched anywhere in the URL
//! - any other entry: a literal substring of the URL

use regex::Regex;
use tracing::warn;

/// Pattern that matches every URL.
pub const MATCH_ALL: &str = "*";

/// A single compiled target-site entry.
#[derive(Debug, Clone)]
pub enum TargetPattern {
    /// Matches every URL.
    Any,
    /// Substring match.
    Literal(String),
    /// Wildcard expanded into a regular expression.
    Glob(Regex),
    /// Wildcard that failed to compile; matches nothing.
    Invalid(String),
}

impl TargetPattern {
    /// Compiles a target-site entry.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        if pattern == MATCH_ALL {
            return Self::Any;
        }

        if !pattern.contains('*') {
            return Self::Literal(pattern.to_string());
        }

        match Regex::new(&pattern.replace('*', ".*")) {
            Ok(re) => Self::Glob(re),
            Err(e) => {
                warn!("[PLAN] Ignoring invalid target pattern '{}': {}", pattern, e);
                Self::Invalid(pattern.to_string())
            }
        }
    }

    /// Returns true if the URL matches this entry.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(s) => url.contains(s.as_str()),
            Self::Glob(re) => re.is_match(url),
            Self::Invalid(_) => false,
        }
    }
}

/// Returns true if a target-site set matches the URL.
#[must_use]
pub fn matches_url(target_sites: &[String], url: &str) -> bool {
    if target_sites.is_empty() || target_sites.iter().any(|s| s == MATCH_ALL) {
        return true;
    }

    target_sites
        .iter()
        .any(|site| TargetPattern::parse(site).matches(url))
}
