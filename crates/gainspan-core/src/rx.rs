// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Receive-side protocol state machine
//!
//! Every logical byte from the link goes through [`RxMachine::step`], which
//! decides whether it is reply text, part of an escape sequence header, an
//! async payload byte or bulk payload. The machine itself has no side
//! effects; it returns an [`RxEvent`] the engine acts on.
//!
//! Escape sequences (after `0x1B`):
//!
//! ```text
//! Z<cid:1 hex><len:4 dec><payload>                      TCP / UDP client data
//! y<cid:1 hex><ip> <port>\t<len:4 dec><payload>         UDP server data
//! A<subtype:1 hex><len:2 dec><payload>                  async notification
//! O / F                                                 bulk write go-ahead / refusal
//! ```

use heapless::Vec;

use crate::frame::{Cid, RxFrame};
use crate::numeric::{parse_ipv4, parse_number, Radix};

/// Escape introducer on the logical byte stream
pub const ESC: u8 = 0x1B;

/// Header and async payload accumulator size
pub const HEADER_CAPACITY: usize = 32;

const BULK_HEADER_LEN: u8 = 5;
const ASYNC_HEADER_LEN: u8 = 3;
const UDP_LENGTH_DIGITS: u8 = 4;

/// Receive state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    /// Between sequences; plain bytes are reply text
    Idle,
    /// Saw the escape introducer
    Esc,
    /// `<ESC>Z` header (cid + length)
    BulkHeader,
    /// `<ESC>y` header up to the space after the address
    UdpAddress,
    /// `<ESC>y` header up to the tab after the port
    UdpPort,
    /// `<ESC>y` header length digits
    UdpLength,
    /// `<ESC>A` header (subtype + length)
    AsyncHeader,
    /// Async payload of announced length
    AsyncPayload,
    /// Bulk payload of the current head frame
    Bulk,
}

/// Completed `<ESC>A` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncMessage {
    /// Subtype announced in the header
    pub subtype: u8,
    /// Payload (subtype digit again, then arguments)
    pub payload: Vec<u8, HEADER_CAPACITY>,
    /// Payload exceeded the accumulator and was cut short
    pub overflowed: bool,
}

/// What the engine has to do with a byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxEvent {
    /// Consumed by the machine, nothing to do
    None,
    /// Plain byte outside any escape sequence (synchronous reply text)
    Text(u8),
    /// A bulk frame header was completed; payload follows
    Frame(RxFrame),
    /// One payload byte of the head frame
    Payload(u8),
    /// A complete async notification
    Async(AsyncMessage),
    /// Reply to a bulk write header: `true` for `<ESC>O`, `false` for `<ESC>F`
    DataReply(bool),
}

/// Receive-side state machine
#[derive(Debug, Clone)]
pub struct RxMachine {
    state: RxState,
    acc: Vec<u8, HEADER_CAPACITY>,
    overflowed: bool,
    left: u8,
    async_subtype: u8,
    head_cid: Option<Cid>,
    head_left: u16,
}

impl Default for RxMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RxMachine {
    /// Create a machine in the idle state
    pub const fn new() -> Self {
        Self {
            state: RxState::Idle,
            acc: Vec::new(),
            overflowed: false,
            left: 0,
            async_subtype: 0,
            head_cid: None,
            head_left: 0,
        }
    }

    /// Drop any partial sequence and return to idle
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current state
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Idle, so the next plain byte is reply text
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Idle
    }

    /// Inside a bulk frame header or its payload
    pub fn in_bulk(&self) -> bool {
        matches!(
            self.state,
            RxState::BulkHeader
                | RxState::UdpAddress
                | RxState::UdpPort
                | RxState::UdpLength
                | RxState::Bulk
        )
    }

    /// Streaming payload bytes
    pub fn in_payload(&self) -> bool {
        self.state == RxState::Bulk
    }

    /// Connection and remaining length of the frame on the wire
    pub fn head_frame(&self) -> Option<(Cid, u16)> {
        match self.state {
            RxState::Bulk => self.head_cid.map(|cid| (cid, self.head_left)),
            _ => None,
        }
    }

    /// Feed one logical byte
    pub fn step(&mut self, byte: u8) -> RxEvent {
        match self.state {
            RxState::Idle => self.on_idle(byte),
            RxState::Esc => self.on_escape(byte),
            RxState::BulkHeader => self.on_bulk_header(byte),
            RxState::UdpAddress => self.on_udp_delimited(byte, b' ', RxState::UdpPort),
            RxState::UdpPort => self.on_udp_delimited(byte, b'\t', RxState::UdpLength),
            RxState::UdpLength => self.on_udp_length(byte),
            RxState::AsyncHeader => self.on_async_header(byte),
            RxState::AsyncPayload => self.on_async_payload(byte),
            RxState::Bulk => self.on_bulk(byte),
        }
    }

    fn on_idle(&mut self, byte: u8) -> RxEvent {
        if byte == ESC {
            self.state = RxState::Esc;
            RxEvent::None
        } else {
            RxEvent::Text(byte)
        }
    }

    fn on_escape(&mut self, byte: u8) -> RxEvent {
        self.acc.clear();
        self.overflowed = false;
        match byte {
            b'Z' => {
                self.state = RxState::BulkHeader;
                self.left = BULK_HEADER_LEN;
                RxEvent::None
            }
            b'A' => {
                self.state = RxState::AsyncHeader;
                self.left = ASYNC_HEADER_LEN;
                RxEvent::None
            }
            b'y' => {
                self.state = RxState::UdpAddress;
                RxEvent::None
            }
            b'O' | b'F' => {
                self.state = RxState::Idle;
                RxEvent::DataReply(byte == b'O')
            }
            other => {
                log::warn!("Unknown escape sequence: <ESC>0x{:02x}", other);
                self.state = RxState::Idle;
                RxEvent::None
            }
        }
    }

    fn accumulate(&mut self, byte: u8) {
        if self.acc.push(byte).is_err() && !self.overflowed {
            log::warn!("Escape sequence accumulator full");
            self.overflowed = true;
        }
    }

    fn on_bulk_header(&mut self, byte: u8) -> RxEvent {
        self.accumulate(byte);
        self.left -= 1;
        if self.left > 0 {
            return RxEvent::None;
        }

        let cid = parse_number(&self.acc[..1], Radix::Hex).and_then(Cid::new);
        let length = parse_number::<u16>(&self.acc[1..], Radix::Decimal);
        match (cid, length) {
            (Some(cid), Some(length)) => {
                log::debug!("Bulk data frame for cid {} containing {} bytes", cid, length);
                self.start_frame(RxFrame::client(cid, length))
            }
            _ => self.malformed(b'Z'),
        }
    }

    fn on_udp_delimited(&mut self, byte: u8, delimiter: u8, next: RxState) -> RxEvent {
        self.accumulate(byte);
        if self.overflowed {
            // No valid address or port is this long; resync on what follows
            return self.malformed(b'y');
        }
        if byte == delimiter {
            self.state = next;
            if next == RxState::UdpLength {
                self.left = UDP_LENGTH_DIGITS;
            }
        }
        RxEvent::None
    }

    fn on_udp_length(&mut self, byte: u8) -> RxEvent {
        self.accumulate(byte);
        self.left -= 1;
        if self.left > 0 {
            return RxEvent::None;
        }

        match self.parse_udp_header() {
            Some(frame) => {
                log::debug!(
                    "UDP server frame for cid {} containing {} bytes",
                    frame.cid,
                    frame.length
                );
                self.start_frame(frame)
            }
            None => self.malformed(b'y'),
        }
    }

    /// `<cid><ip> <port>\t<len:4>`
    fn parse_udp_header(&self) -> Option<RxFrame> {
        if self.overflowed {
            return None;
        }
        let (cid_digit, rest) = self.acc.split_first()?;
        let cid = parse_number(core::slice::from_ref(cid_digit), Radix::Hex).and_then(Cid::new)?;

        let space = rest.iter().position(|&b| b == b' ')?;
        let (ip, rest) = (&rest[..space], &rest[space + 1..]);
        let tab = rest.iter().position(|&b| b == b'\t')?;
        let (port, length) = (&rest[..tab], &rest[tab + 1..]);
        if length.len() != UDP_LENGTH_DIGITS as usize {
            return None;
        }

        Some(RxFrame::udp_server(
            cid,
            parse_number(length, Radix::Decimal)?,
            parse_ipv4(ip)?,
            parse_number(port, Radix::Decimal)?,
        ))
    }

    fn start_frame(&mut self, frame: RxFrame) -> RxEvent {
        if frame.is_done() {
            log::debug!("Empty bulk frame for cid {}", frame.cid);
            self.state = RxState::Idle;
            return RxEvent::None;
        }
        self.head_cid = Some(frame.cid);
        self.head_left = frame.length;
        self.state = RxState::Bulk;
        RxEvent::Frame(frame)
    }

    fn on_async_header(&mut self, byte: u8) -> RxEvent {
        self.accumulate(byte);
        self.left -= 1;
        if self.left > 0 {
            return RxEvent::None;
        }

        log::debug!("Async header received");
        let subtype = parse_number::<u8>(&self.acc[..1], Radix::Hex);
        let length = parse_number::<u8>(&self.acc[1..], Radix::Decimal);
        match (subtype, length) {
            (Some(subtype), Some(length)) => {
                self.async_subtype = subtype;
                self.acc.clear();
                self.overflowed = false;
                if length == 0 {
                    return self.finish_async();
                }
                self.left = length;
                self.state = RxState::AsyncPayload;
                RxEvent::None
            }
            _ => self.malformed(b'A'),
        }
    }

    fn on_async_payload(&mut self, byte: u8) -> RxEvent {
        self.accumulate(byte);
        self.left -= 1;
        if self.left > 0 {
            return RxEvent::None;
        }
        self.finish_async()
    }

    fn finish_async(&mut self) -> RxEvent {
        self.state = RxState::Idle;
        RxEvent::Async(AsyncMessage {
            subtype: self.async_subtype,
            payload: self.acc.clone(),
            overflowed: self.overflowed,
        })
    }

    fn on_bulk(&mut self, byte: u8) -> RxEvent {
        self.head_left = self.head_left.saturating_sub(1);
        if self.head_left == 0 {
            self.state = RxState::Idle;
            self.head_cid = None;
        }
        log::trace!("Bulk byte 0x{:02x}", byte);
        RxEvent::Payload(byte)
    }

    fn malformed(&mut self, kind: u8) -> RxEvent {
        log::warn!(
            "Invalid escape sequence: <ESC>{}{:?}",
            kind as char,
            core::str::from_utf8(&self.acc).unwrap_or("<binary>")
        );
        self.state = RxState::Idle;
        RxEvent::None
    }
}
