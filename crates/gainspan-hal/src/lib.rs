// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

#![no_std]
#![warn(missing_docs)]

//! # Gainspan HAL
//!
//! Platform abstraction for the Gainspan Serial-to-WiFi protocol engine.
//!
//! This crate provides:
//! - **HAL traits** (`hal` module) - the byte-level primitives the engine needs
//!   from a board: a UART-style port, a single-byte SPI exchange, an optional
//!   data-ready input and a monotonic clock
//! - **Platform implementations** (`platforms` module) - a host clock for
//!   desktop tools and tests (behind the `std` feature)
//!
//! Pin setup and module power-on sequencing stay with the board support
//! package; everything here assumes the peripherals are already configured.
//!
//! ## Feature Flags
//!
//! - `std` - host clock backed by `std::time::Instant`
//! - `embedded-hal` - adapters for `embedded_hal::spi::SpiDevice` and
//!   `embedded_hal::digital::InputPin`

#[cfg(feature = "std")]
extern crate std;

/// Hardware abstraction traits shared by all platforms.
pub mod hal;

/// Concrete platform implementations.
pub mod platforms;

// Re-export commonly used types
pub use hal::{DataReadyPin, NoDataReadyPin, SerialPort, SpiExchange, TimeProvider};

#[cfg(feature = "embedded-hal")]
pub use hal::{EhDataReady, EhSpi};

#[cfg(feature = "std")]
pub use platforms::HostClock;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
