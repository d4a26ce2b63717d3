// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Rejects values the engine cannot work with before the engine is built.

use crate::{ConfigError, ConfigResult, GainspanConfig};

/// Log levels accepted in `[logging]`
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    MustBeNonZero { field: String },
    OutOfRange { field: String, value: u64, max: u64 },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MustBeNonZero { field } => write!(f, "{} must be greater than zero", field),
            Self::OutOfRange { field, value, max } => {
                write!(f, "{} = {} exceeds the maximum of {}", field, value, max)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Zero timeouts and budgets (the engine would fault or never progress)
/// - SPI poll intervals the engine cannot represent
/// - Unknown log levels
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &GainspanConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// Every validation problem in `config`
pub fn collect_errors(config: &GainspanConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_engine(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn validate_engine(config: &GainspanConfig, errors: &mut Vec<ConfigValidationError>) {
    let engine = &config.engine;
    let non_zero = [
        ("engine.response_timeout_ms", engine.response_timeout_ms as u64),
        ("engine.spi_poll_interval_us", engine.spi_poll_interval_us as u64),
        ("engine.poll_budget", engine.poll_budget as u64),
        ("engine.write_retry_budget", engine.write_retry_budget as u64),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ConfigValidationError::MustBeNonZero {
                field: field.to_string(),
            });
        }
    }

    if engine.spi_poll_interval_us > u16::MAX as u32 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "engine.spi_poll_interval_us".to_string(),
            value: engine.spi_poll_interval_us as u64,
            max: u16::MAX as u64,
        });
    }
}

fn validate_logging(config: &GainspanConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!(
                "'{}' is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }
}
