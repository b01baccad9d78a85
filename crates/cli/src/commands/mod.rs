//! Subcommand implementations

pub mod analyze;
pub mod schedules;
pub mod selectors;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// Read a JSON list from `path`. The file may hold the list itself or an
/// object carrying it under `key`, so a daemon inventory file works too.
pub fn load_list<T: DeserializeOwned>(path: &Path, key: &str) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_list(&raw, key).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_list<T: DeserializeOwned>(raw: &str, key: &str) -> Result<Vec<T>> {
    let list = match serde_json::from_str::<Value>(raw)? {
        list @ Value::Array(_) => list,
        Value::Object(mut map) => match map.remove(key) {
            Some(list) => list,
            None => bail!("expected a \"{}\" list", key),
        },
        _ => bail!("expected a JSON list or an object with a \"{}\" list", key),
    };
    Ok(serde_json::from_value(list)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snooze_lib::models::Selector;

    #[test]
    fn test_parse_bare_list() {
        let selectors: Vec<Selector> =
            parse_list(r#"[{"provider": "aws"}, {}]"#, "selectors").unwrap();
        assert_eq!(selectors.len(), 2);
        assert_eq!(selectors[0].provider.as_deref(), Some("aws"));
    }

    #[test]
    fn test_parse_wrapped_list() {
        let selectors: Vec<Selector> =
            parse_list(r#"{"selectors": [{"provider": "gcp"}]}"#, "selectors").unwrap();
        assert_eq!(selectors[0].provider.as_deref(), Some("gcp"));
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = parse_list::<Selector>(r#"{"schedules": []}"#, "selectors").unwrap_err();
        assert!(err.to_string().contains("selectors"));
        assert!(parse_list::<Selector>("42", "selectors").is_err());
    }
}
