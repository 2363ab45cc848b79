//! Environment-variable helpers shared by the `from_env` constructors.

use std::str::FromStr;

use crate::error::CoreError;

/// Read `key`, falling back to `default` when unset or blank.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read an optional variable. Blank counts as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `key` as `T`, using `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => parse_value(key, &raw),
    }
}

/// Parse a raw value, naming the variable in the error.
pub fn parse_value<T>(key: &str, raw: &str) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| CoreError::Validation(format!("{key} has invalid value {raw:?}: {e}")))
}

/// Parse a boolean flag (`1`/`true`/`yes`/`on` and their negations).
pub fn parse_flag(key: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_value_names_the_variable() {
        let err = parse_value::<u32>("REELSMITH_SCENE_COUNT", "twelve").unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("REELSMITH_SCENE_COUNT"));
        assert_eq!(parse_value::<u32>("X", "12").unwrap(), 12);
    }

    #[test]
    fn flags() {
        assert!(parse_flag("X", "TRUE").unwrap());
        assert!(!parse_flag("X", "off").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn unset_variable_uses_default() {
        assert_eq!(
            env_parse::<u64>("REELSMITH_TEST_SURELY_UNSET_VARIABLE", 7).unwrap(),
            7
        );
        assert_eq!(env_or("REELSMITH_TEST_SURELY_UNSET_VARIABLE", "x"), "x");
    }
}
