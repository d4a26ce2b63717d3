// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logical byte links to the module
//!
//! A [`Link`] hides the difference between the UART interface, where every
//! wire byte is a logical byte, and the SPI interface, where bytes are
//! stuffed by the [`SpiFramer`] and every written byte also clocks one byte
//! in.

use gainspan_hal::{DataReadyPin, NoDataReadyPin, SerialPort, SpiExchange, TimeProvider};

use crate::config::EngineConfig;
use crate::error::LinkError;
use crate::framer::{escape, SpiFramer, SPI_IDLE};

/// Idle exchanges per full SPI poll
///
/// An idle module keeps its SPI output FIFO topped up with 63 idle bytes
/// that stay in front of real data, so 64 reads are needed to be sure
/// nothing is pending.
pub const SPI_FULL_POLL: u16 = 64;

/// Logical byte stream to the module
pub trait Link {
    /// Read one logical byte without blocking
    fn read_byte(&mut self) -> Result<Option<u8>, LinkError>;

    /// Write logical bytes
    ///
    /// Links that receive while transmitting (SPI) hand every logical byte
    /// received along the way to `on_rx`, in order.
    fn write_bytes(&mut self, data: &[u8], on_rx: &mut dyn FnMut(u8)) -> Result<(), LinkError>;

    /// Apply engine tuning parameters
    fn configure(&mut self, _config: &EngineConfig) {}

    /// Forget framing and flow-control state
    fn reset(&mut self) {}
}

impl<L: Link + ?Sized> Link for &mut L {
    fn read_byte(&mut self) -> Result<Option<u8>, LinkError> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, data: &[u8], on_rx: &mut dyn FnMut(u8)) -> Result<(), LinkError> {
        (**self).write_bytes(data, on_rx)
    }

    fn configure(&mut self, config: &EngineConfig) {
        (**self).configure(config)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Link over a UART-style serial port
#[derive(Debug)]
pub struct UartLink<S> {
    port: S,
    write_retry_budget: u16,
}

impl<S: SerialPort> UartLink<S> {
    /// Wrap a configured serial port
    pub fn new(port: S) -> Self {
        Self {
            port,
            write_retry_budget: EngineConfig::DEFAULT_WRITE_RETRY_BUDGET,
        }
    }

    /// Give the port back
    pub fn into_inner(self) -> S {
        self.port
    }
}

impl<S: SerialPort> Link for UartLink<S> {
    fn read_byte(&mut self) -> Result<Option<u8>, LinkError> {
        let byte = self.port.read_byte().map_err(|e| {
            log::error!("Serial read failed: {:?}", e);
            LinkError::Transport
        })?;
        if let Some(b) = byte {
            log::trace!("<= 0x{:02x}", b);
        }
        Ok(byte)
    }

    fn write_bytes(&mut self, data: &[u8], _on_rx: &mut dyn FnMut(u8)) -> Result<(), LinkError> {
        let mut rest = data;
        let mut tries = self.write_retry_budget;
        while !rest.is_empty() {
            let written = self.port.write(rest).map_err(|e| {
                log::error!("Serial write failed: {:?}", e);
                LinkError::Transport
            })?;
            if written == 0 {
                if tries == 0 {
                    log::error!("Serial port stopped accepting data");
                    return Err(LinkError::Stalled);
                }
                tries -= 1;
            }
            rest = &rest[written.min(rest.len())..];
        }
        self.port.flush().map_err(|e| {
            log::error!("Serial flush failed: {:?}", e);
            LinkError::Transport
        })
    }

    fn configure(&mut self, config: &EngineConfig) {
        self.write_retry_budget = config.write_retry_budget;
    }
}

/// Link over SPI with byte stuffing and flow control
///
/// Without a data-ready pin, reads have to poll. A full poll clocks up to
/// [`SPI_FULL_POLL`] idle bytes but is done at most once per poll interval;
/// reads in between clock a single byte and advance the poll timestamp by
/// 1/64 of the interval, so back-to-back reads still add up to full polls.
#[derive(Debug)]
pub struct SpiLink<D, T, P = NoDataReadyPin> {
    spi: D,
    clock: T,
    data_ready: P,
    framer: SpiFramer,
    poll_interval_us: u64,
    last_poll_us: Option<u64>,
    write_retry_budget: u16,
}

impl<D: SpiExchange, T: TimeProvider> SpiLink<D, T, NoDataReadyPin> {
    /// SPI link without a data-ready input (paced polling)
    pub fn new(spi: D, clock: T) -> Self {
        Self::with_data_ready(spi, clock, NoDataReadyPin)
    }
}

impl<D: SpiExchange, T: TimeProvider, P: DataReadyPin> SpiLink<D, T, P> {
    /// SPI link gated by the module's data-ready output
    pub fn with_data_ready(spi: D, clock: T, data_ready: P) -> Self {
        Self {
            spi,
            clock,
            data_ready,
            framer: SpiFramer::new(),
            poll_interval_us: EngineConfig::DEFAULT_SPI_POLL_INTERVAL_US as u64,
            last_poll_us: None,
            write_retry_budget: EngineConfig::DEFAULT_WRITE_RETRY_BUDGET,
        }
    }

    /// Whether the module currently asserts XOFF
    pub fn xoff(&self) -> bool {
        self.framer.xoff()
    }

    /// Give the peripherals back
    pub fn into_parts(self) -> (D, T, P) {
        (self.spi, self.clock, self.data_ready)
    }

    fn exchange(&mut self, out: u8) -> Result<Option<u8>, LinkError> {
        let wire = self.spi.exchange(out).map_err(|e| {
            log::error!("SPI exchange failed: {:?}", e);
            LinkError::Transport
        })?;
        if wire != SPI_IDLE || out != SPI_IDLE {
            log::trace!("SPI: >> 0x{:02x} << 0x{:02x}", out, wire);
        }
        self.framer.decode(wire)
    }

    /// Number of idle exchanges this read may spend
    fn read_tries(&mut self) -> u16 {
        if self.data_ready.is_connected() {
            return SPI_FULL_POLL;
        }

        let now = self.clock.get_time_us();
        let interval = self.poll_interval_us;
        let Some(last) = self.last_poll_us else {
            self.last_poll_us = Some(now);
            return SPI_FULL_POLL;
        };

        let since = now.saturating_sub(last);
        if since < interval {
            // Polled recently: one byte, credited as 1/64 of a full poll
            let step = interval / SPI_FULL_POLL as u64;
            self.last_poll_us = Some(if since < step { now } else { last + step });
            1
        } else {
            self.last_poll_us = Some(now);
            SPI_FULL_POLL
        }
    }
}

impl<D: SpiExchange, T: TimeProvider, P: DataReadyPin> Link for SpiLink<D, T, P> {
    fn read_byte(&mut self) -> Result<Option<u8>, LinkError> {
        if self.data_ready.is_connected() && !self.data_ready.is_ready() {
            return Ok(None);
        }

        let mut tries = self.read_tries();
        while tries > 0 {
            if let Some(byte) = self.exchange(SPI_IDLE)? {
                return Ok(Some(byte));
            }
            // The byte after an escape is data; fetch it within the same try
            if !self.framer.in_escape() {
                tries -= 1;
            }
        }
        Ok(None)
    }

    fn write_bytes(&mut self, data: &[u8], on_rx: &mut dyn FnMut(u8)) -> Result<(), LinkError> {
        let mut tries = self.write_retry_budget;
        let mut rest = data;

        while let Some((&byte, tail)) = rest.split_first() {
            if self.framer.xoff() {
                // Module buffer full: clock idle bytes until it sends XON
                if tries == 0 {
                    log::error!("SPI write stalled by XOFF, {} bytes unsent", rest.len());
                    return Err(LinkError::Stalled);
                }
                tries -= 1;
                if let Some(rx) = self.exchange(SPI_IDLE)? {
                    on_rx(rx);
                }
                continue;
            }

            log::trace!(">= 0x{:02x}", byte);
            for &wire in escape(byte).wire_bytes().as_slice() {
                if let Some(rx) = self.exchange(wire)? {
                    on_rx(rx);
                }
            }
            rest = tail;
        }
        Ok(())
    }

    fn configure(&mut self, config: &EngineConfig) {
        self.poll_interval_us = config.spi_poll_interval_us as u64;
        self.write_retry_budget = config.write_retry_budget;
    }

    fn reset(&mut self) {
        self.framer.reset();
        self.last_poll_us = None;
    }
}
