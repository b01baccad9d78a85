//! Instance-level selector evaluation
//!
//! Two combination rules exist side by side. Live scheduling ORs the
//! selectors of a schedule; the preview path takes an explicit operator.

use super::matcher::{matches, CompiledMatcher};
use crate::error::SelectorError;
use crate::models::{Instance, MatchType, Matcher, Selector};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the preview path combines a list of selectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorOperator {
    And,
    #[default]
    Or,
}

impl std::str::FromStr for SelectorOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(SelectorOperator::And),
            "or" => Ok(SelectorOperator::Or),
            other => Err(format!("unknown selector operator '{}', expected and|or", other)),
        }
    }
}

/// Check one selector against an instance. Absent fields are wildcards,
/// a required tag key missing from the instance fails the selector.
pub fn selector_matches(instance: &Instance, selector: &Selector) -> bool {
    if !matches(&instance.name, selector.name.as_ref()) {
        return false;
    }

    if let Some(provider) = &selector.provider {
        if *provider != instance.provider {
            return false;
        }
    }

    if !matches(&instance.region, selector.region.as_ref()) {
        return false;
    }

    if !matches(&instance.engine, selector.engine.as_ref()) {
        return false;
    }

    tags_match(&instance.tags, &selector.tags)
}

fn tags_match(tags: &HashMap<String, String>, wanted: &HashMap<String, Matcher>) -> bool {
    wanted.iter().all(|(key, matcher)| match tags.get(key) {
        Some(value) => matches(value, Some(matcher)),
        None => false,
    })
}

/// Scheduling rule: true iff any selector matches. An empty list never matches.
pub fn schedule_matches(instance: &Instance, selectors: &[Selector]) -> bool {
    selectors.iter().any(|s| selector_matches(instance, s))
}

/// Preview rule: combine selectors with an explicit operator. An empty list
/// never matches. The instance provider is normalised to "aws"/"gcp" first.
pub fn match_instance(
    instance: &Instance,
    selectors: &[Selector],
    operator: SelectorOperator,
) -> bool {
    if selectors.is_empty() {
        return false;
    }

    let normalized = Instance {
        provider: normalize_provider(&instance.provider).to_string(),
        ..instance.clone()
    };

    match operator {
        SelectorOperator::And => selectors.iter().all(|s| selector_matches(&normalized, s)),
        SelectorOperator::Or => selectors.iter().any(|s| selector_matches(&normalized, s)),
    }
}

fn normalize_provider(provider: &str) -> &'static str {
    if provider.starts_with("aws") {
        "aws"
    } else {
        "gcp"
    }
}

/// Compile every regex matcher and report the first one that is invalid
pub fn validate_selectors(selectors: &[Selector]) -> Result<(), SelectorError> {
    for (i, selector) in selectors.iter().enumerate() {
        let index = i + 1;
        let fields = [
            ("name", selector.name.as_ref()),
            ("region", selector.region.as_ref()),
            ("engine", selector.engine.as_ref()),
        ];
        for (field, matcher) in fields {
            if let Some(m) = matcher {
                check_regex(index, field.to_string(), m)?;
            }
        }

        let mut keys: Vec<&String> = selector.tags.keys().collect();
        keys.sort();
        for key in keys {
            check_regex(index, format!("tag '{}'", key), &selector.tags[key])?;
        }
    }
    Ok(())
}

fn check_regex(index: usize, field: String, matcher: &Matcher) -> Result<(), SelectorError> {
    if matcher.match_type != MatchType::Regex {
        return Ok(());
    }
    Regex::new(&matcher.pattern)
        .map(|_| ())
        .map_err(|source| SelectorError::InvalidRegex {
            index,
            field,
            source,
        })
}

/// A selector with all of its regexes compiled, for evaluating one schedule
/// against many instances
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    name: Option<CompiledMatcher>,
    provider: Option<String>,
    region: Option<CompiledMatcher>,
    engine: Option<CompiledMatcher>,
    tags: Vec<(String, CompiledMatcher)>,
}

impl CompiledSelector {
    pub fn compile(selector: &Selector) -> Self {
        Self {
            name: selector.name.as_ref().map(CompiledMatcher::compile),
            provider: selector.provider.clone(),
            region: selector.region.as_ref().map(CompiledMatcher::compile),
            engine: selector.engine.as_ref().map(CompiledMatcher::compile),
            tags: selector
                .tags
                .iter()
                .map(|(k, m)| (k.clone(), CompiledMatcher::compile(m)))
                .collect(),
        }
    }

    pub fn compile_all(selectors: &[Selector]) -> Vec<Self> {
        selectors.iter().map(Self::compile).collect()
    }

    pub fn is_match(&self, instance: &Instance) -> bool {
        let field_ok = |m: &Option<CompiledMatcher>, v: &str| {
            m.as_ref().map(|m| m.is_match(v)).unwrap_or(true)
        };

        if !field_ok(&self.name, &instance.name) {
            return false;
        }
        if let Some(provider) = &self.provider {
            if *provider != instance.provider {
                return false;
            }
        }
        if !field_ok(&self.region, &instance.region) || !field_ok(&self.engine, &instance.engine) {
            return false;
        }
        self.tags.iter().all(|(key, m)| {
            instance
                .tags
                .get(key)
                .map(|v| m.is_match(v))
                .unwrap_or(false)
        })
    }

    /// OR across compiled selectors, same rule as [`schedule_matches`]
    pub fn any_match(selectors: &[Self], instance: &Instance) -> bool {
        selectors.iter().any(|s| s.is_match(instance))
    }
}
