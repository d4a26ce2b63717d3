// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Values are layered:
//! 1. TOML file (base values, missing fields take defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)
//!
//! The result is validated before it is returned.

use crate::{validate_config, ConfigError, ConfigResult, GainspanConfig, TransportKind};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "gainspan.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "GAINSPAN_CONFIG_PATH";

/// Find the configuration file
///
/// Search order:
/// 1. `GAINSPAN_CONFIG_PATH` environment variable
/// 2. Current working directory: `./gainspan.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let cwd = env::current_dir()?;
    let search_paths: Vec<PathBuf> = cwd
        .ancestors()
        .take(6)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .collect();

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is not found, contains invalid TOML, an
/// override does not parse, or the result fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<GainspanConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: GainspanConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `GAINSPAN_RESPONSE_TIMEOUT_MS` -> `engine.response_timeout_ms`
/// - `GAINSPAN_SPI_POLL_INTERVAL_US` -> `engine.spi_poll_interval_us`
/// - `GAINSPAN_POLL_BUDGET` -> `engine.poll_budget`
/// - `GAINSPAN_TRANSPORT` -> `transport.kind`
/// - `GAINSPAN_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut GainspanConfig) -> ConfigResult<()> {
    if let Ok(value) = env::var("GAINSPAN_RESPONSE_TIMEOUT_MS") {
        config.engine.response_timeout_ms = parse_value("GAINSPAN_RESPONSE_TIMEOUT_MS", &value)?;
    }
    if let Ok(value) = env::var("GAINSPAN_SPI_POLL_INTERVAL_US") {
        config.engine.spi_poll_interval_us =
            parse_value("GAINSPAN_SPI_POLL_INTERVAL_US", &value)?;
    }
    if let Ok(value) = env::var("GAINSPAN_POLL_BUDGET") {
        config.engine.poll_budget = parse_value("GAINSPAN_POLL_BUDGET", &value)?;
    }
    if let Ok(value) = env::var("GAINSPAN_TRANSPORT") {
        config.transport.kind = parse_value("GAINSPAN_TRANSPORT", &value)?;
    }
    if let Ok(value) = env::var("GAINSPAN_LOG_LEVEL") {
        config.logging.level = value;
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"transport": "spi", "poll_budget": "256"}`)
pub fn apply_cli_overrides(
    config: &mut GainspanConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("response_timeout_ms") {
        config.engine.response_timeout_ms = parse_value("response_timeout_ms", value)?;
    }
    if let Some(value) = cli_args.get("spi_poll_interval_us") {
        config.engine.spi_poll_interval_us = parse_value("spi_poll_interval_us", value)?;
    }
    if let Some(value) = cli_args.get("poll_budget") {
        config.engine.poll_budget = parse_value("poll_budget", value)?;
    }
    if let Some(value) = cli_args.get("transport") {
        config.transport.kind = parse_value::<TransportKind>("transport", value)?;
    }
    if let Some(value) = cli_args.get("data_ready_pin") {
        config.transport.data_ready_pin = value.to_lowercase() == "true" || value == "1";
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    Ok(())
}

fn parse_value<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{} = '{}': {}", name, value, e)))
}
