//! Configuration loading shared by flurry components.
//!
//! Components describe their settings as serde structs; this module turns a
//! YAML document (or file) into one, substituting environment variables first.

mod vars;

pub use vars::interpolate;

use std::path::Path;

use serde::de::DeserializeOwned;
use snafu::ResultExt;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Parse a YAML document into `T` after environment variable interpolation.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let text = interpolate(contents)?;
    serde_yaml::from_str(&text).context(YamlParseSnafu)
}

/// Read a YAML file and parse it into `T`.
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}
