//! Single-field string matching

use crate::models::{MatchType, Matcher};
use regex::Regex;
use tracing::debug;

/// Apply a matcher to a value. An absent matcher leaves the field
/// unconstrained; a regex that fails to compile matches nothing.
pub fn matches(value: &str, matcher: Option<&Matcher>) -> bool {
    let Some(matcher) = matcher else {
        return true;
    };

    match matcher.match_type {
        MatchType::Exact => value == matcher.pattern,
        MatchType::Contains => value.contains(matcher.pattern.as_str()),
        MatchType::Prefix => value.starts_with(matcher.pattern.as_str()),
        MatchType::Suffix => value.ends_with(matcher.pattern.as_str()),
        MatchType::Regex => match Regex::new(&matcher.pattern) {
            Ok(re) => re.is_match(value),
            Err(e) => {
                debug!(pattern = %matcher.pattern, error = %e, "Invalid regex never matches");
                false
            }
        },
    }
}

/// A matcher with its regex compiled once up front
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Exact(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
    Regex(Regex),
    /// Regex pattern that failed to compile
    Never,
}

impl CompiledMatcher {
    pub fn compile(matcher: &Matcher) -> Self {
        let pattern = matcher.pattern.clone();
        match matcher.match_type {
            MatchType::Exact => CompiledMatcher::Exact(pattern),
            MatchType::Contains => CompiledMatcher::Contains(pattern),
            MatchType::Prefix => CompiledMatcher::Prefix(pattern),
            MatchType::Suffix => CompiledMatcher::Suffix(pattern),
            MatchType::Regex => match Regex::new(&pattern) {
                Ok(re) => CompiledMatcher::Regex(re),
                Err(_) => CompiledMatcher::Never,
            },
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            CompiledMatcher::Exact(p) => value == p,
            CompiledMatcher::Contains(p) => value.contains(p.as_str()),
            CompiledMatcher::Prefix(p) => value.starts_with(p.as_str()),
            CompiledMatcher::Suffix(p) => value.ends_with(p.as_str()),
            CompiledMatcher::Regex(re) => re.is_match(value),
            CompiledMatcher::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_is_byte_equality() {
        assert!(matches("x", Some(&Matcher::exact("x"))));
        assert!(!matches("X", Some(&Matcher::exact("x"))));
        assert!(!matches("xy", Some(&Matcher::exact("x"))));
    }

    #[test]
    fn test_substring_match_types() {
        let contains = Matcher::new("prod", MatchType::Contains);
        let prefix = Matcher::new("prod-", MatchType::Prefix);
        let suffix = Matcher::new("-replica", MatchType::Suffix);

        assert!(matches("orders-prod-db", Some(&contains)));
        assert!(!matches("orders-dev-db", Some(&contains)));
        assert!(matches("prod-orders", Some(&prefix)));
        assert!(!matches("orders-prod-", Some(&prefix)));
        assert!(matches("orders-replica", Some(&suffix)));
        assert!(!matches("replica-orders", Some(&suffix)));
    }

    #[test]
    fn test_empty_pattern_substring_matches_everything() {
        assert!(matches("anything", Some(&Matcher::new("", MatchType::Contains))));
        assert!(matches("", Some(&Matcher::new("", MatchType::Prefix))));
    }

    #[test]
    fn test_regex_match() {
        let m = Matcher::regex(r"^db-\d+$");
        assert!(matches("db-42", Some(&m)));
        assert!(!matches("db-x", Some(&m)));
    }

    #[test]
    fn test_invalid_regex_fails_closed() {
        let m = Matcher::regex("(");
        assert!(!matches("xy", Some(&m)));
        assert!(!matches("(", Some(&m)));
    }

    #[test]
    fn test_absent_matcher_is_wildcard() {
        assert!(matches("whatever", None));
        assert!(matches("", None));
    }

    #[test]
    fn test_compiled_matcher_agrees_with_uncompiled() {
        let cases = [
            Matcher::exact("a"),
            Matcher::new("b", MatchType::Contains),
            Matcher::new("a", MatchType::Prefix),
            Matcher::new("c", MatchType::Suffix),
            Matcher::regex("^a.c$"),
            Matcher::regex("[unclosed"),
        ];
        for m in &cases {
            let compiled = CompiledMatcher::compile(m);
            for value in ["a", "abc", "xbx", "cab", ""] {
                assert_eq!(
                    compiled.is_match(value),
                    matches(value, Some(m)),
                    "matcher {:?} on {:?}",
                    m,
                    value
                );
            }
        }
    }
}
