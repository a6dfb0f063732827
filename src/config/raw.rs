//! Untyped user parameters as they arrive from testbed files, the environment
//! and the command line, plus the string normalisation applied before they
//! become [`TestParameters`](super::TestParameters).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key whose value is never coerced (file lists attached by the lab runner)
pub const MH_FILES_KEY: &str = "mh_files";

/// A single user parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

/// Raw user parameters keyed by name
pub type UserParams = BTreeMap<String, RawValue>;

impl RawValue {
    /// Normalise a string value: boolean spellings and numeric-looking
    /// strings become typed values, everything else is unchanged
    pub fn coerced(self) -> RawValue {
        match self {
            RawValue::Str(text) => coerce_str(text),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Str(text) => Some(text),
            _ => None,
        }
    }

    /// String entries of a list, or the value itself when it is a string
    pub fn as_str_list(&self) -> Vec<String> {
        match self {
            RawValue::Str(text) => vec![text.clone()],
            RawValue::List(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, RawValue>> {
        match self {
            RawValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("null"),
            RawValue::Bool(value) => write!(f, "{}", value),
            RawValue::Int(value) => write!(f, "{}", value),
            RawValue::Float(value) => write!(f, "{}", value),
            RawValue::Str(text) => f.write_str(text),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => f.write_str("<unprintable>"),
            },
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Str(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Str(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

fn coerce_str(text: String) -> RawValue {
    match text.as_str() {
        "true" | "True" => return RawValue::Bool(true),
        "false" | "False" => return RawValue::Bool(false),
        _ => {}
    }

    if looks_like_integer(&text) {
        if let Ok(value) = text.parse::<i64>() {
            return RawValue::Int(value);
        }
    }

    if looks_like_float(&text) {
        if let Ok(value) = text.parse::<f64>() {
            return RawValue::Float(value);
        }
    }

    RawValue::Str(text)
}

fn looks_like_integer(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn looks_like_float(text: &str) -> bool {
    text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
}

/// Apply [`RawValue::coerced`] to every parameter except `mh_files`
pub fn coerce_user_params(raw: &UserParams) -> UserParams {
    raw.iter()
        .map(|(key, value)| {
            let value = if key == MH_FILES_KEY {
                value.clone()
            } else {
                value.clone().coerced()
            };
            (key.clone(), value)
        })
        .collect()
}

/// First path registered under `key` in the `files` mapping, falling back to
/// `mh_files`
pub fn file_entry(raw: &UserParams, key: &str) -> Option<String> {
    ["files", MH_FILES_KEY]
        .iter()
        .filter_map(|group| raw.get(*group).and_then(RawValue::as_map))
        .filter_map(|files| files.get(key))
        .flat_map(RawValue::as_str_list)
        .find(|path| !path.is_empty())
}

/// Overlay `overrides` on `base`; keys in `overrides` win
pub fn merge_user_params(base: UserParams, overrides: UserParams) -> UserParams {
    let mut merged = base;
    merged.extend(overrides);
    merged
}

/// Parse a `key=value` pair given on the command line
pub fn parse_key_value(pair: &str) -> crate::Result<(String, RawValue)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| crate::AppError::config(format!("Expected key=value, got '{}'", pair)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(crate::AppError::config(format!("Empty parameter name in '{}'", pair)));
    }
    Ok((key.to_string(), RawValue::Str(value.trim().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boolean_spellings() {
        assert_eq!(RawValue::from("true").coerced(), RawValue::Bool(true));
        assert_eq!(RawValue::from("True").coerced(), RawValue::Bool(true));
        assert_eq!(RawValue::from("false").coerced(), RawValue::Bool(false));
        assert_eq!(RawValue::from("False").coerced(), RawValue::Bool(false));
        assert_eq!(RawValue::from("TRUE").coerced(), RawValue::from("TRUE"));
        assert_eq!(RawValue::Bool(true).coerced(), RawValue::Bool(true));
    }

    #[test]
    fn test_numeric_strings() {
        assert_eq!(RawValue::from("5000").coerced(), RawValue::Int(5000));
        assert_eq!(RawValue::from("-3").coerced(), RawValue::Int(-3));
        assert_eq!(RawValue::from("0.25").coerced(), RawValue::Float(0.25));
        assert_eq!(RawValue::from("1e3").coerced(), RawValue::Float(1000.0));
        assert_eq!(RawValue::from("5G").coerced(), RawValue::from("5G"));
        assert_eq!(RawValue::from("").coerced(), RawValue::from(""));
        assert_eq!(RawValue::from("-").coerced(), RawValue::from("-"));
        assert_eq!(RawValue::from("1.2.3").coerced(), RawValue::from("1.2.3"));
    }

    #[test]
    fn test_mh_files_is_not_coerced() {
        let mut raw = UserParams::new();
        raw.insert(MH_FILES_KEY.to_string(), RawValue::from("true"));
        raw.insert("reset_wifi_connection".to_string(), RawValue::from("False"));

        let coerced = coerce_user_params(&raw);
        assert_eq!(coerced[MH_FILES_KEY], RawValue::from("true"));
        assert_eq!(coerced["reset_wifi_connection"], RawValue::Bool(false));
    }

    #[test]
    fn test_yaml_values_deserialize() {
        let yaml = "a: 1\nb: true\nc: hello\nd: [x, y]\ne: 0.5\nf: ~\ng: {k: v}\n";
        let parsed: UserParams = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed["a"], RawValue::Int(1));
        assert_eq!(parsed["b"], RawValue::Bool(true));
        assert_eq!(parsed["c"], RawValue::from("hello"));
        assert_eq!(parsed["d"].as_str_list(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(parsed["e"], RawValue::Float(0.5));
        assert_eq!(parsed["f"], RawValue::Null);
        assert!(parsed["g"].as_map().is_some());
    }

    #[test]
    fn test_file_entry_lookup() {
        let yaml = "files:\n  nearby_snippet: [/a.apk]\nmh_files:\n  nearby_snippet: [/b.apk]\n  nearby_snippet_2: /c.apk\n";
        let raw: UserParams = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file_entry(&raw, "nearby_snippet").as_deref(), Some("/a.apk"));
        assert_eq!(file_entry(&raw, "nearby_snippet_2").as_deref(), Some("/c.apk"));
        assert_eq!(file_entry(&raw, "nearby_snippet_3p"), None);
    }

    #[test]
    fn test_merge_and_key_value() {
        let mut base = UserParams::new();
        base.insert("wifi_ssid".to_string(), RawValue::from("lab"));
        base.insert("skip_bug_report".to_string(), RawValue::Bool(false));
        let (key, value) = parse_key_value("skip_bug_report = true").unwrap();
        let mut overrides = UserParams::new();
        overrides.insert(key, value);

        let merged = merge_user_params(base, overrides);
        assert_eq!(merged["wifi_ssid"], RawValue::from("lab"));
        assert_eq!(merged["skip_bug_report"], RawValue::from("true"));
        assert!(parse_key_value("no_equals_sign").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    proptest! {
        #[test]
        fn prop_integer_strings_become_integers(n in any::<i64>()) {
            prop_assert_eq!(RawValue::Str(n.to_string()).coerced(), RawValue::Int(n));
        }

        #[test]
        fn prop_alphabetic_strings_are_unchanged(s in "[a-zA-Z_]{2,12}") {
            prop_assume!(!matches!(s.as_str(), "true" | "True" | "false" | "False"));
            prop_assert_eq!(RawValue::Str(s.clone()).coerced(), RawValue::Str(s));
        }
    }
}
