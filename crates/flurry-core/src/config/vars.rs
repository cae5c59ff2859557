//! Environment variable substitution for YAML configuration.
//!
//! Recognized forms:
//! - `$VAR` and `${VAR}` - the variable's value; an error if it is unset
//! - `${VAR:-fallback}` - `fallback` when VAR is unset or empty
//! - `${VAR-fallback}` - `fallback` only when VAR is unset
//! - `$$` - a literal `$`

use std::env;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ConfigError;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:(?P<escape>\$)|\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<op>:?-)(?P<fallback>[^}]*))?\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))",
    )
    .expect("variable pattern is valid")
});

/// Substitute environment variables in `input`.
///
/// Every unresolved variable is collected so a single error lists all of them.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut errors = Vec::new();

    let text = VARIABLE.replace_all(input, |caps: &Captures<'_>| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }

        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return caps[0].to_string();
        };
        let name = name.as_str();
        let fallback = caps.name("fallback").map(|m| m.as_str());
        let empty_uses_fallback = caps.name("op").is_some_and(|op| op.as_str() == ":-");

        match env::var(name) {
            Ok(value) if value.contains(['\n', '\r']) => {
                errors.push(format!("environment variable '{name}' contains a newline"));
                caps[0].to_string()
            }
            Ok(value) if value.is_empty() && empty_uses_fallback => {
                fallback.unwrap_or_default().to_string()
            }
            Ok(value) => value,
            Err(_) => match fallback {
                Some(fallback) => fallback.to_string(),
                None => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    caps[0].to_string()
                }
            },
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(ConfigError::EnvInterpolation { errors })
    }
}
