// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! SPI link framing (byte stuffing and flow control)
//!
//! On the SPI interface the module reserves a handful of byte values for link
//! control. Logical data bytes that collide with one of them are sent as
//! `ESC, byte ^ 0x20`; everything else travels as-is.
//!
//! ```text
//! wire value   meaning
//! 0x00         all zeros (module busy, e.g. saving profile to flash)
//! 0xF3         ack
//! 0xF5         idle (no data)
//! 0xFA         XOFF (stop sending)
//! 0xFB         escape (next byte is XOR 0x20)
//! 0xFD         XON (resume sending)
//! 0xFF         all ones (module dropped off the bus)
//! ```

use crate::error::LinkError;

/// All-zeros filler, seen while the module is busy writing flash
pub const SPI_ALL_ZEROS: u8 = 0x00;
/// Ack byte (no known meaning for the host)
pub const SPI_ACK: u8 = 0xF3;
/// Idle byte, sent by either side when it has nothing to say
pub const SPI_IDLE: u8 = 0xF5;
/// Flow control: the module's receive buffer is full
pub const SPI_XOFF: u8 = 0xFA;
/// Escape introducer for reserved values
pub const SPI_ESC: u8 = 0xFB;
/// Flow control: the module accepts data again
pub const SPI_XON: u8 = 0xFD;
/// All-ones, what the bus reads when the module is not driving it
pub const SPI_ALL_ONES: u8 = 0xFF;
/// Mask applied to an escaped byte
pub const SPI_ESC_XOR: u8 = 0x20;

/// Consecutive all-ones reads tolerated before the link is declared dead
pub const ALL_ONES_LIMIT: u8 = 20;

/// Whether `byte` has a link-control meaning on the wire
pub const fn is_reserved(byte: u8) -> bool {
    matches!(
        byte,
        SPI_ALL_ZEROS | SPI_ACK | SPI_IDLE | SPI_XOFF | SPI_ESC | SPI_XON | SPI_ALL_ONES
    )
}

/// Wire encoding of one logical byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    /// Sent unchanged
    Plain(u8),
    /// Sent as `ESC` followed by the masked value
    Escaped(u8),
}

impl Encoded {
    /// Wire bytes to clock out, in order
    pub fn wire_bytes(&self) -> Wire {
        match *self {
            Encoded::Plain(b) => Wire { bytes: [b, 0], len: 1 },
            Encoded::Escaped(b) => Wire {
                bytes: [SPI_ESC, b],
                len: 2,
            },
        }
    }
}

/// Up to two wire bytes produced by [`escape`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    bytes: [u8; 2],
    len: usize,
}

impl Wire {
    /// The bytes as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Encode one logical byte for the wire
pub const fn escape(byte: u8) -> Encoded {
    if is_reserved(byte) {
        Encoded::Escaped(byte ^ SPI_ESC_XOR)
    } else {
        Encoded::Plain(byte)
    }
}

/// Decoder state for the receive direction, plus the flow-control flag the
/// transmit direction has to honour
#[derive(Debug, Default, Clone)]
pub struct SpiFramer {
    prev_was_esc: bool,
    xoff: bool,
    all_ones_run: u8,
}

impl SpiFramer {
    /// Create a framer in the idle, flow-on state
    pub const fn new() -> Self {
        Self {
            prev_was_esc: false,
            xoff: false,
            all_ones_run: 0,
        }
    }

    /// Forget any half-received escape and flow-control state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the module asked us to stop sending
    pub fn xoff(&self) -> bool {
        self.xoff
    }

    /// An escape byte was received and its data byte is still to come
    pub fn in_escape(&self) -> bool {
        self.prev_was_esc
    }

    /// Decode one wire byte
    ///
    /// Returns `Ok(Some(data))` for a logical data byte, `Ok(None)` for a
    /// control byte that carries no data, and `Err(LinkError::DeadLink)` once
    /// more than [`ALL_ONES_LIMIT`] all-ones bytes arrived in a row.
    pub fn decode(&mut self, wire: u8) -> Result<Option<u8>, LinkError> {
        if self.prev_was_esc {
            // Escaped: never interpret, just unmask
            self.prev_was_esc = false;
            return Ok(Some(wire ^ SPI_ESC_XOR));
        }

        if wire != SPI_ALL_ONES {
            self.all_ones_run = 0;
        }

        match wire {
            SPI_ALL_ONES => {
                log::warn!("SPI 0xff received");
                self.all_ones_run = self.all_ones_run.saturating_add(1);
                if self.all_ones_run > ALL_ONES_LIMIT {
                    self.all_ones_run = 0;
                    log::error!("SPI link dead: more than {} consecutive 0xff", ALL_ONES_LIMIT);
                    return Err(LinkError::DeadLink);
                }
                Ok(None)
            }
            SPI_ALL_ZEROS => {
                log::trace!("SPI 0x00 received");
                Ok(None)
            }
            SPI_ACK => {
                log::debug!("SPI ack received");
                Ok(None)
            }
            SPI_IDLE => Ok(None),
            SPI_XOFF => {
                self.xoff = true;
                Ok(None)
            }
            SPI_XON => {
                self.xoff = false;
                Ok(None)
            }
            SPI_ESC => {
                self.prev_was_esc = true;
                Ok(None)
            }
            data => Ok(Some(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(framer: &mut SpiFramer, wire: &[u8]) -> Option<u8> {
        let mut out = None;
        for &b in wire {
            if let Some(d) = framer.decode(b).unwrap() {
                assert!(out.is_none(), "more than one data byte decoded");
                out = Some(d);
            }
        }
        out
    }

    #[test]
    fn test_reserved_bytes_are_escaped() {
        for b in [0x00, 0xF3, 0xF5, 0xFA, 0xFB, 0xFD, 0xFF] {
            assert!(matches!(escape(b), Encoded::Escaped(_)), "0x{:02x}", b);
        }
        assert_eq!(escape(b'A'), Encoded::Plain(b'A'));
        assert_eq!(escape(0xFB).wire_bytes().as_slice(), &[0xFB, 0xDB]);
    }

    #[test]
    fn test_escape_then_decode_roundtrip_all_bytes() {
        let mut framer = SpiFramer::new();
        for b in 0..=255u8 {
            let wire = escape(b).wire_bytes();
            assert_eq!(decode_all(&mut framer, wire.as_slice()), Some(b));
        }
    }

    #[test]
    fn test_flow_control_updates_state() {
        let mut framer = SpiFramer::new();
        assert_eq!(framer.decode(SPI_XOFF), Ok(None));
        assert!(framer.xoff());
        assert_eq!(framer.decode(SPI_XON), Ok(None));
        assert!(!framer.xoff());
    }

    #[test]
    fn test_escaped_control_value_is_data() {
        let mut framer = SpiFramer::new();
        assert_eq!(framer.decode(SPI_ESC), Ok(None));
        // An escaped XOFF value is data, and must not touch flow control
        assert_eq!(framer.decode(SPI_XOFF), Ok(Some(SPI_XOFF ^ SPI_ESC_XOR)));
        assert!(!framer.xoff());
    }

    #[test]
    fn test_dead_link_after_threshold() {
        let mut framer = SpiFramer::new();
        for _ in 0..ALL_ONES_LIMIT {
            assert_eq!(framer.decode(SPI_ALL_ONES), Ok(None));
        }
        assert_eq!(framer.decode(SPI_ALL_ONES), Err(LinkError::DeadLink));
    }

    #[test]
    fn test_all_ones_run_resets_on_other_byte() {
        let mut framer = SpiFramer::new();
        for _ in 0..ALL_ONES_LIMIT {
            framer.decode(SPI_ALL_ONES).unwrap();
        }
        assert_eq!(framer.decode(SPI_IDLE), Ok(None));
        for _ in 0..ALL_ONES_LIMIT {
            assert_eq!(framer.decode(SPI_ALL_ONES), Ok(None));
        }
    }
}
