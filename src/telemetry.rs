//! Structured logging setup.
//!
//! The library only emits `tracing` events; binaries decide where they go.
//! `RUST_LOG` takes precedence over the filter passed in.

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// Returns false if a global subscriber was already installed, which is
/// common in tests that initialise logging more than once.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        let _ = init_tracing("swarm_breaker=debug");
        assert!(!init_tracing("info"));
    }
}
