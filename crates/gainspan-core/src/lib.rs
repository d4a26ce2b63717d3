// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

//! # Gainspan Core
//!
//! Allocation-free protocol engine for Gainspan Serial-to-WiFi modules.
//!
//! The module multiplexes three channels over one byte stream: synchronous
//! AT command replies, bulk payload for up to 16 connections, and escaped
//! async lifecycle notifications. This crate turns that stream back into
//! the three channels:
//!
//! - [`framer`] - SPI byte stuffing and flow control
//! - [`link`] - UART and SPI links over the `gainspan-hal` traits
//! - [`rx`] - receive state machine
//! - [`ring`] - shared payload buffer and frame queue
//! - [`response`] - reply code parsing and the reply line buffer
//! - [`async_event`] - async notification parsing and dispatch
//! - [`connection`] - connection table and lifecycle events
//! - [`engine`] - the engine tying it all together
//!
//! ## Example
//!
//! ```no_run
//! use gainspan_core::{Cid, Engine, UartLink};
//! # use gainspan_hal::{SerialPort, TimeProvider};
//! # struct Port;
//! # impl SerialPort for Port {
//! #     type Error = ();
//! #     fn read_byte(&mut self) -> Result<Option<u8>, ()> { Ok(None) }
//! #     fn write(&mut self, d: &[u8]) -> Result<usize, ()> { Ok(d.len()) }
//! # }
//! # struct Clock;
//! # impl TimeProvider for Clock { fn get_time_us(&self) -> u64 { 0 } }
//!
//! let mut engine = Engine::new(UartLink::new(Port), Clock);
//! engine.begin()?;
//! loop {
//!     engine.poll(&mut ())?;
//!     let cid = Cid::new(1).unwrap();
//!     let mut buf = [0u8; 64];
//!     let n = engine.read_into(cid, &mut buf);
//!     engine.write_data(cid, &buf[..n])?;
//! }
//! # Ok::<(), gainspan_core::EngineError>(())
//! ```
//!
//! The engine is single-threaded by contract: it takes `&mut self`
//! everywhere and must not be shared between an interrupt handler and the
//! main loop.

pub mod async_event;
pub mod command;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod framer;
pub mod link;
pub mod numeric;
pub mod response;
pub mod ring;
pub mod rx;

pub use async_event::{AsyncEvent, AsyncKind};
pub use command::Command;
pub use config::EngineConfig;
pub use connection::{Connection, ConnectionTable, Events};
pub use engine::{Engine, EventHandler, ResponseData};
pub use error::{EngineError, LinkError, Result};
pub use frame::{Cid, RxFrame, MAX_BULK_CHUNK, MAX_CID};
pub use link::{Link, SpiLink, UartLink};
pub use response::ResponseCode;
pub use ring::FrameQueue;
pub use rx::{RxEvent, RxMachine, RxState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
