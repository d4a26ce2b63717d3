// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Engine tuning parameters

/// Engine tuning parameters
///
/// The defaults match the module's documented behaviour; the host-side
/// `gainspan-config` crate fills this from `gainspan.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long to wait for a reply before latching the fault
    pub response_timeout_ms: u32,
    /// Minimum interval between full SPI polls when no data-ready pin is wired
    pub spi_poll_interval_us: u16,
    /// Maximum bytes processed by one `poll`
    pub poll_budget: u16,
    /// Idle exchanges a single write may spend waiting for XON
    pub write_retry_budget: u16,
}

impl EngineConfig {
    /// Default reply timeout
    pub const DEFAULT_RESPONSE_TIMEOUT_MS: u32 = 1000;
    /// Default SPI poll interval
    pub const DEFAULT_SPI_POLL_INTERVAL_US: u16 = 2000;
    /// Default poll budget
    pub const DEFAULT_POLL_BUDGET: u16 = 1024;
    /// Default write retry budget
    pub const DEFAULT_WRITE_RETRY_BUDGET: u16 = 1024;

    /// Configuration with all defaults
    pub const fn new() -> Self {
        Self {
            response_timeout_ms: Self::DEFAULT_RESPONSE_TIMEOUT_MS,
            spi_poll_interval_us: Self::DEFAULT_SPI_POLL_INTERVAL_US,
            poll_budget: Self::DEFAULT_POLL_BUDGET,
            write_retry_budget: Self::DEFAULT_WRITE_RETRY_BUDGET,
        }
    }

    /// Set the reply timeout
    pub const fn with_response_timeout_ms(mut self, ms: u32) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    /// Set the SPI poll interval
    pub const fn with_spi_poll_interval_us(mut self, us: u16) -> Self {
        self.spi_poll_interval_us = us;
        self
    }

    /// Set the per-poll byte budget
    pub const fn with_poll_budget(mut self, bytes: u16) -> Self {
        self.poll_budget = bytes;
        self
    }

    /// Set the XOFF retry budget
    pub const fn with_write_retry_budget(mut self, tries: u16) -> Self {
        self.write_retry_budget = tries;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
