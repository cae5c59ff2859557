//! flurry-core: Shared plumbing for the flurry write engine.
//!
//! This crate holds the ambient pieces the engine and its hosts have in common:
//!
//! - `config/` - Byte size constants, YAML loading and environment variable interpolation
//! - `metrics/` - Internal events emitted as `metrics` counters, gauges and histograms
//! - `tracing` - Subscriber initialization for plugin hosts and tests
//! - `error` - Configuration error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing;

// Re-export commonly used items
pub use config::{KB, MB, interpolate, load_yaml, parse_yaml};
pub use error::ConfigError;
pub use tracing::init_tracing;
