//! Error types shared by flurry crates.

use snafu::prelude::*;

/// Errors that can occur while loading configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// One or more environment variables could not be substituted.
    #[snafu(display("Environment variable interpolation failed:\n{}", errors.join("\n")))]
    EnvInterpolation { errors: Vec<String> },

    /// A configured value is out of range.
    #[snafu(display("Invalid value for '{field}': {message}"))]
    InvalidValue { field: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_interpolation_lists_every_error() {
        let err = ConfigError::EnvInterpolation {
            errors: vec!["'A' is not set".into(), "'B' is not set".into()],
        };
        let text = err.to_string();
        assert!(text.contains("'A' is not set"));
        assert!(text.contains("'B' is not set"));
    }

    #[test]
    fn test_invalid_value_names_field() {
        let err = ConfigError::InvalidValue {
            field: "batch_timeout_ms",
            message: "too large".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for 'batch_timeout_ms': too large"
        );
    }
}
