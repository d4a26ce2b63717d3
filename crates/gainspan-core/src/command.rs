// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed AT commands and bulk data headers
//!
//! Every command is rendered into a bounded buffer: at most
//! [`MAX_COMMAND_LEN`] bytes of command text, followed by `\r\n`. Longer
//! text is truncated and the truncation logged; it is never sent past the
//! limit.

use core::fmt::{self, Write};
use core::net::Ipv4Addr;

use heapless::Vec;

use crate::frame::Cid;
use crate::rx::ESC;

/// Longest command line, without terminator
pub const MAX_COMMAND_LEN: usize = 127;

/// Rendered command line including `\r\n`
pub type CommandLine = Vec<u8, { MAX_COMMAND_LEN + 2 }>;

/// `<ESC>Z<cid><len:4>`
pub type BulkHeader = Vec<u8, 7>;

/// `<ESC>Y<cid><ip>:<port>:<len:4>`
pub type UdpServerHeader = Vec<u8, 32>;

/// Bytes of a bulk header sent before waiting for the module's go-ahead
pub const HEADER_PREFIX_LEN: usize = 3;

/// Commands the engine issues itself, plus free-form command text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `ATV0` / `ATV1`: numeric or verbose reply codes
    Verbose(bool),
    /// `ATE0` / `ATE1`: command echo
    Echo(bool),
    /// `AT+BDATA=<n>`: bulk data mode
    BulkData(bool),
    /// `AT+ASYNCMSGFMT=<n>`: escaped async notification format
    AsyncMessageFormat(bool),
    /// Any other command text, sent as-is
    Raw(&'a str),
}

impl Command<'_> {
    /// Render the command line, `\r\n` included
    pub fn encode(&self) -> CommandLine {
        let mut out = Bounded::<{ MAX_COMMAND_LEN + 2 }>::new(MAX_COMMAND_LEN);
        // Bounded never fails, it records truncation instead
        let _ = self.write_text(&mut out);
        if out.truncated {
            log::error!(
                "Command truncated: {}",
                core::str::from_utf8(&out.buf).unwrap_or("<binary>")
            );
        }
        log::debug!(">>= {}", core::str::from_utf8(&out.buf).unwrap_or("<binary>"));

        let mut line = out.buf;
        // Capacity reserves the terminator
        let _ = line.extend_from_slice(b"\r\n");
        line
    }

    fn write_text(&self, out: &mut impl Write) -> fmt::Result {
        match *self {
            Command::Verbose(on) => write!(out, "ATV{}", on as u8),
            Command::Echo(on) => write!(out, "ATE{}", on as u8),
            Command::BulkData(on) => write!(out, "AT+BDATA={}", on as u8),
            Command::AsyncMessageFormat(on) => write!(out, "AT+ASYNCMSGFMT={}", on as u8),
            Command::Raw(text) => out.write_str(text),
        }
    }
}

/// Header for an outgoing TCP or UDP client frame
pub fn bulk_header(cid: Cid, len: u16) -> BulkHeader {
    let mut out = Bounded::<7>::new(7);
    let _ = write!(out, "{}Z{:x}{:04}", ESC as char, cid.get(), len);
    out.buf
}

/// Header for an outgoing UDP server frame
pub fn udp_server_header(cid: Cid, ip: Ipv4Addr, port: u16, len: u16) -> UdpServerHeader {
    let mut out = Bounded::<32>::new(32);
    let _ = write!(out, "{}Y{:x}{}:{}:{:04}", ESC as char, cid.get(), ip, port, len);
    out.buf
}

/// `fmt::Write` sink that stops at `limit` bytes and remembers it did
struct Bounded<const N: usize> {
    buf: Vec<u8, N>,
    limit: usize,
    truncated: bool,
}

impl<const N: usize> Bounded<N> {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit: limit.min(N),
            truncated: false,
        }
    }
}

impl<const N: usize> Write for Bounded<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &b in s.as_bytes() {
            if self.buf.len() >= self.limit || self.buf.push(b).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_commands() {
        assert_eq!(&Command::Verbose(false).encode()[..], b"ATV0\r\n");
        assert_eq!(&Command::Echo(false).encode()[..], b"ATE0\r\n");
        assert_eq!(&Command::BulkData(true).encode()[..], b"AT+BDATA=1\r\n");
        assert_eq!(
            &Command::AsyncMessageFormat(true).encode()[..],
            b"AT+ASYNCMSGFMT=1\r\n"
        );
        assert_eq!(&Command::Raw("AT+NSTAT=?").encode()[..], b"AT+NSTAT=?\r\n");
    }

    #[test]
    fn test_long_command_is_truncated() {
        let long = "X".repeat(200);
        let line = Command::Raw(&long).encode();
        assert_eq!(line.len(), MAX_COMMAND_LEN + 2);
        assert!(line.ends_with(b"X\r\n"));
    }

    #[test]
    fn test_bulk_header() {
        let cid = Cid::new(10).unwrap();
        assert_eq!(&bulk_header(cid, 42)[..], b"\x1bZa0042");
        assert_eq!(&bulk_header(cid, 1400)[..], b"\x1bZa1400");
    }

    #[test]
    fn test_udp_server_header() {
        let cid = Cid::new(2).unwrap();
        let header = udp_server_header(cid, Ipv4Addr::new(192, 168, 10, 200), 65535, 1400);
        assert_eq!(&header[..], b"\x1bY2192.168.10.200:65535:1400");
    }
}
