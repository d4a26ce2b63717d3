// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Gainspan - protocol engine for Gainspan Serial-to-WiFi modules
//!
//! The Gainspan GS1011 family runs the whole WiFi and TCP/IP stack on the
//! module; the host talks to it over UART or SPI with AT commands, bulk data
//! frames and escaped async notifications, all on one byte stream. This
//! crate is the host side of that stream.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! gainspan = "0.3"  # Default: std (host tools, config, logging)
//! ```
//!
//! For firmware, depend on the engine only:
//!
//! ```toml
//! [dependencies]
//! gainspan = { version = "0.3", default-features = false }
//! ```
//!
//! ## Feature Flags
//!
//! - **`std`** (default): `std::error::Error` impls, host clock, the
//!   configuration loader and logging setup. Disable it for firmware
//!   builds (engine and HAL only)
//! - **`embedded-hal`**: adapters from `embedded-hal` 1.0 SPI devices and
//!   input pins
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: gainspan-hal                               │
//! │  (serial port, SPI exchange, data-ready pin, clock)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Engine: gainspan-core                                  │
//! │  (SPI framer, RX state machine, ring buffer, parsers)   │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Host: gainspan-config, gainspan-observability          │
//! │  (gainspan.toml, log setup)                             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use gainspan::prelude::*;
//! # struct Port;
//! # impl SerialPort for Port {
//! #     type Error = ();
//! #     fn read_byte(&mut self) -> Result<Option<u8>, ()> { Ok(None) }
//! #     fn write(&mut self, d: &[u8]) -> Result<usize, ()> { Ok(d.len()) }
//! # }
//!
//! let mut engine = Engine::new(UartLink::new(Port), HostClock::new());
//! engine.begin()?;
//! engine.write_command_check_ok(Command::Raw("AT+WD"))?;
//! # Ok::<(), EngineError>(())
//! ```
//!
//! ## License
//!
//! Apache-2.0

#![cfg_attr(not(feature = "std"), no_std)]

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export foundation
pub use gainspan_hal as hal;

// Re-export the engine
pub use gainspan_core as engine;

// Re-export host layers
#[cfg(feature = "std")]
pub use gainspan_config as config;

#[cfg(feature = "std")]
pub use gainspan_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use gainspan_core::{
        Cid, Command, Engine, EngineConfig, EngineError, EventHandler, Link, LinkError,
        ResponseCode, SpiLink, UartLink,
    };
    pub use gainspan_hal::{DataReadyPin, SerialPort, SpiExchange, TimeProvider};

    #[cfg(feature = "std")]
    pub use gainspan_hal::HostClock;

    #[cfg(feature = "std")]
    pub use gainspan_config::{load_config, GainspanConfig};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let cid = Cid::new(3).unwrap();
        assert_eq!(cid.get(), 3);
        assert_eq!(EngineConfig::default().poll_budget, 1024);
    }
}
