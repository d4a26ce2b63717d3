// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Data-ready input signal abstractions.
pub mod gpio;
/// Serial input/output traits for UART-style communication.
pub mod serial;
/// Single-byte SPI exchange traits.
pub mod spi;
/// Hardware Abstraction Layer (HAL) trait definitions for the module link
///
/// This module defines platform-agnostic traits that must be implemented
/// by each board to provide:
/// - Time management (TimeProvider)
/// - Serial I/O (SerialPort)
/// - SPI byte exchange (SpiExchange)
/// - Data-ready signalling (DataReadyPin)

/// Timekeeping abstractions (monotonic timers).
pub mod time;

// Re-export trait types
pub use gpio::{DataReadyPin, NoDataReadyPin};
pub use serial::SerialPort;
pub use spi::SpiExchange;
pub use time::TimeProvider;

#[cfg(feature = "embedded-hal")]
pub use gpio::EhDataReady;

#[cfg(feature = "embedded-hal")]
pub use spi::EhSpi;
