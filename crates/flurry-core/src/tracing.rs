//! Tracing initialization for plugin hosts and tests.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Install a formatted subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns an error instead of panicking when a global subscriber is already
/// set, so test binaries can call it from every test.
pub fn init_tracing() -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }
}
