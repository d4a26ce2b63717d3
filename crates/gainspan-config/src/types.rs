// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section of `gainspan.toml`. Every field has a
//! default, so an empty file is a valid configuration.

use gainspan_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GainspanConfig {
    pub engine: EngineSettings,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// `[engine]`: protocol engine tuning
///
/// The poll interval is kept wider than the engine's field so an
/// out-of-range value is reported by validation instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    pub response_timeout_ms: u32,
    pub spi_poll_interval_us: u32,
    pub poll_budget: u16,
    pub write_retry_budget: u16,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: EngineConfig::DEFAULT_RESPONSE_TIMEOUT_MS,
            spi_poll_interval_us: EngineConfig::DEFAULT_SPI_POLL_INTERVAL_US as u32,
            poll_budget: EngineConfig::DEFAULT_POLL_BUDGET,
            write_retry_budget: EngineConfig::DEFAULT_WRITE_RETRY_BUDGET,
        }
    }
}

impl EngineSettings {
    /// Engine tuning built from these settings
    ///
    /// Call after [`validate_config`](crate::validate_config); an
    /// unvalidated poll interval saturates at the engine's maximum.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_response_timeout_ms(self.response_timeout_ms)
            .with_spi_poll_interval_us(
                u16::try_from(self.spi_poll_interval_us).unwrap_or(u16::MAX),
            )
            .with_poll_budget(self.poll_budget)
            .with_write_retry_budget(self.write_retry_budget)
    }
}

/// Physical interface to the module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Uart,
    Spi,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Uart => write!(f, "uart"),
            TransportKind::Spi => write!(f, "spi"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uart" | "serial" => Ok(TransportKind::Uart),
            "spi" => Ok(TransportKind::Spi),
            other => Err(format!("unknown transport '{}' (expected uart or spi)", other)),
        }
    }
}

/// `[transport]`: how the module is wired
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// SPI only: the module's data-ready output is wired to an input
    pub data_ready_pin: bool,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
