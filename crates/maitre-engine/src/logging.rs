//! Tracing setup.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! embedding application's call. These helpers cover the common cases so a
//! binary can get structured output in one line.

use tracing_subscriber::EnvFilter;

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns quietly if a subscriber is already installed, so tests and
/// embedding applications can both call it without coordination.
pub fn init() {
    init_with_filter("info");
}

/// Install a global subscriber with an explicit default filter.
///
/// `RUST_LOG` still takes precedence over `default_filter`.
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_init_is_harmless() {
        init();
        init_with_filter("debug");
    }
}
