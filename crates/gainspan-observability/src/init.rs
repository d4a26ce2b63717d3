// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization for host tools
//!
//! Installs a console `fmt` subscriber. `log` records from the engine
//! crates are forwarded into it, so firmware code and host code share one
//! filter and one output.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::CrateDebugFlags;

/// Build the filter for `debug_flags` on top of `base_level`
///
/// `RUST_LOG`, when set, replaces the computed filter entirely.
pub fn build_filter(debug_flags: &CrateDebugFlags, base_level: &str) -> Result<EnvFilter> {
    if let Ok(directives) = std::env::var(EnvFilter::DEFAULT_ENV) {
        return EnvFilter::try_new(&directives)
            .with_context(|| format!("Invalid {} filter: {}", EnvFilter::DEFAULT_ENV, directives));
    }
    let filter = debug_flags.to_filter_string(base_level);
    EnvFilter::try_new(&filter).with_context(|| format!("Invalid log filter: {}", filter))
}

/// Initialize console logging
///
/// # Arguments
/// * `debug_flags` - Per-crate debug flags
/// * `base_level` - Level for everything not raised by a flag (`info`, `warn`, ...)
///
/// # Errors
/// Fails on an invalid filter, or if a global subscriber or logger is
/// already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, base_level: &str) -> Result<()> {
    let filter = build_filter(debug_flags, base_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug_flags.any_enabled())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    tracing::debug!(
        "Logging initialized (debug crates: {:?})",
        debug_flags.enabled_crates
    );
    Ok(())
}

/// Initialize logging at `info` with flags from the command line and environment
pub fn init_logging_default() -> Result<CrateDebugFlags> {
    let flags = crate::cli::parse_debug_flags();
    init_logging(&flags, "info")?;
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_flags() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let flags = CrateDebugFlags::from_args(vec!["--debug-gainspan-core".to_string()]);
        let filter = build_filter(&flags, "warn").unwrap();
        assert!(filter.to_string().contains("gainspan_core=debug"));
    }

    #[test]
    fn test_build_filter_rejects_garbage_level() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        assert!(build_filter(&CrateDebugFlags::default(), "gainspan_core=loud").is_err());
    }

    #[test]
    fn test_second_init_fails() {
        let flags = CrateDebugFlags::default();
        // The first call may race other tests for the global subscriber
        let _ = init_logging(&flags, "info");
        assert!(init_logging(&flags, "info").is_err());
    }
}
