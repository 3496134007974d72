//! Dotted numeric version comparison.
//!
//! Versions are split on `.`, each segment read as a non-negative integer
//! of any length. Segments that are missing or not numeric count as 0, so
//! `1.2` and `1.2.0` are equal. Used only to decide whether a remote version
//! is newer.

use std::cmp::Ordering;
use std::fmt;

/// One numeric segment, stored as its digits without leading zeros.
///
/// Zero is the empty string. Ordering is by length, then lexical, which is
/// numeric ordering without a width limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
struct Segment(String);

impl Segment {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Self::default();
        }
        Self(raw.trim_start_matches('0').to_string())
    }

    fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "0")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A parsed dotted numeric version.
///
/// Trailing zero segments are dropped on parse so the derived ordering is
/// the segment-wise numeric ordering with implicit zero padding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DottedVersion(Vec<Segment>);

impl DottedVersion {
    /// Parses a version string. Never fails.
    #[must_use]
    pub fn parse(version: &str) -> Self {
        let mut segments: Vec<Segment> = version.split('.').map(Segment::parse).collect();

        while segments.last().is_some_and(Segment::is_zero) {
            segments.pop();
        }

        Self(segments)
    }

    /// Returns the number of significant segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for a version equal to 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "0");
        }
        let parts: Vec<String> = self.0.iter().map(Segment::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Compares two version strings segment by segment.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    DottedVersion::parse(a).cmp(&DottedVersion::parse(b))
}

/// Returns true if `candidate` is strictly newer than `current`.
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(compare_versions("1.2.0", "1.2"), Ordering::Equal);
        assert_eq!(compare_versions("1", "1.0.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_numeric_not_lexical() {
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("0.2", "0.10"), Ordering::Less);
    }

    #[test]
    fn test_longer_version_with_extra_segment() {
        assert_eq!(compare_versions("2.0", "2.0.0.1"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0.1", "2.0"), Ordering::Greater);
    }

    #[test]
    fn test_non_numeric_segments_count_as_zero() {
        assert_eq!(compare_versions("1.x", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("", "0"), Ordering::Equal);
        assert_eq!(compare_versions("1.beta.2", "1.0.2"), Ordering::Equal);
    }

    #[test]
    fn test_segments_wider_than_u64() {
        assert_eq!(
            compare_versions("1.18446744073709551616", "1.1"),
            Ordering::Greater
        );
        assert_eq!(
            compare_versions("1.18446744073709551617", "1.18446744073709551616"),
            Ordering::Greater
        );
        assert_eq!(compare_versions("1.007", "1.7"), Ordering::Equal);
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("1.1.0", "1.0.0"));
        assert!(!is_newer("1.0.0", "1.0.0"));
        assert!(!is_newer("1.0", "1.0.1"));
    }

    #[test]
    fn test_display() {
        assert_eq!(DottedVersion::parse("1.2.0").to_string(), "1.2");
        assert_eq!(DottedVersion::parse("0.0").to_string(), "0");
        assert_eq!(DottedVersion::parse("01.0.3").to_string(), "1.0.3");
        assert_eq!(DottedVersion::parse("1.0.3").len(), 3);
    }
}
