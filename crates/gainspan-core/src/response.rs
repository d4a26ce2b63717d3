// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synchronous reply parsing
//!
//! With `ATV0` the module ends every command reply with a numeric code
//! (`"0"` to `"18"`), optionally followed by a space and arguments. Any
//! other line is data: firmware version strings, scan results and so on.
//! Since a data line can look like a code (`"2.5.1"`), classification is
//! deliberately strict and anything unexpected is reported as
//! [`ResponseCode::Unknown`].

use crate::frame::Cid;
use crate::numeric::{parse_number, Radix};

/// Longest line that can still be a reply code with arguments
pub const MAX_RESPONSE_SIZE: usize = 16;

/// Line buffer size used when unknown lines are handed to a callback
pub const MAX_DATA_LINE_SIZE: usize = 128;

/// Reply codes in non-verbose mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// `0`, also `OK`
    Success,
    /// `1`
    Failure,
    /// `2`, invalid command or argument
    Einval,
    /// `3 <cid>`, socket failure
    SockFail,
    /// `4`, no free connection id
    Enocid,
    /// `5`, bad connection id
    Ebadcid,
    /// `6`, not supported
    Enotsup,
    /// `7 <cid>`, connection established
    ConSuccess,
    /// `8`, connection closed (async only)
    Ecidclose,
    /// `9`, association lost
    LinkLost,
    /// `10`, disassociation (async only)
    DisassoEvt,
    /// `11`, out of standby timer (async only)
    StbyTmrEvt,
    /// `12`, out of standby alarm (async only)
    StbyAlmEvt,
    /// `13`, out of deep sleep (async only)
    DpsleepEvt,
    /// `14`, unexpected warm boot (async only)
    BootUnexpec,
    /// `15`, no IP address
    Enoip,
    /// `16`, internal PA boot (async only)
    BootInternal,
    /// `17`, external PA boot (async only)
    BootExternal,
    /// `18`, network connection manager associated (async only)
    NwconnSuccess,
    /// Not a reply code; the line is data
    Unknown,
}

impl ResponseCode {
    /// Map a numeric code to its variant
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => ResponseCode::Success,
            1 => ResponseCode::Failure,
            2 => ResponseCode::Einval,
            3 => ResponseCode::SockFail,
            4 => ResponseCode::Enocid,
            5 => ResponseCode::Ebadcid,
            6 => ResponseCode::Enotsup,
            7 => ResponseCode::ConSuccess,
            8 => ResponseCode::Ecidclose,
            9 => ResponseCode::LinkLost,
            10 => ResponseCode::DisassoEvt,
            11 => ResponseCode::StbyTmrEvt,
            12 => ResponseCode::StbyAlmEvt,
            13 => ResponseCode::DpsleepEvt,
            14 => ResponseCode::BootUnexpec,
            15 => ResponseCode::Enoip,
            16 => ResponseCode::BootInternal,
            17 => ResponseCode::BootExternal,
            18 => ResponseCode::NwconnSuccess,
            _ => ResponseCode::Unknown,
        }
    }

    /// Whether this code ends a command reply
    ///
    /// `CONNECT <cid>` is followed by a final `OK`, and unknown lines are
    /// data that precede the code.
    pub const fn is_final(self) -> bool {
        !matches!(self, ResponseCode::Unknown | ResponseCode::ConSuccess)
    }
}

/// Result of classifying one reply line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine {
    /// Reply code, `Unknown` for data lines
    pub code: ResponseCode,
    /// Connection id from a `CONNECT <cid>` reply
    pub connect_cid: Option<Cid>,
}

impl ParsedLine {
    const UNKNOWN: Self = Self {
        code: ResponseCode::Unknown,
        connect_cid: None,
    };

    const fn code(code: ResponseCode) -> Self {
        Self {
            code,
            connect_cid: None,
        }
    }
}

/// Classify one reply line (without line terminator)
///
/// `expect_connect` must be set for commands that answer `CONNECT <cid>`;
/// otherwise such a line is treated as data.
pub fn parse_line(line: &[u8], expect_connect: bool) -> ParsedLine {
    let (code, args) = match line {
        [b'1', d @ b'0'..=b'8', args @ ..] => (ResponseCode::from_code(10 + (d - b'0')), args),
        [d @ b'0'..=b'9', args @ ..] => (ResponseCode::from_code(d - b'0'), args),
        b"OK" => (ResponseCode::Success, &line[2..]),
        _ => return ParsedLine::UNKNOWN,
    };

    // Code digits are followed by nothing or by a space
    if !args.is_empty() && args[0] != b' ' {
        return ParsedLine::UNKNOWN;
    }

    match code {
        ResponseCode::Success
        | ResponseCode::Failure
        | ResponseCode::Einval
        | ResponseCode::Enocid
        | ResponseCode::Ebadcid
        | ResponseCode::Enotsup
        | ResponseCode::LinkLost
        | ResponseCode::Enoip => {
            if args.is_empty() {
                ParsedLine::code(code)
            } else {
                ParsedLine::UNKNOWN
            }
        }

        // Normally async, but AT+NSUDP replies with it when binding fails
        ResponseCode::SockFail => {
            if args.len() == 2 {
                ParsedLine::code(code)
            } else {
                ParsedLine::UNKNOWN
            }
        }

        ResponseCode::ConSuccess => {
            if args.len() != 2 || !expect_connect {
                return ParsedLine::UNKNOWN;
            }
            match parse_number(&args[1..], Radix::Hex).and_then(Cid::new) {
                Some(cid) => ParsedLine {
                    code,
                    connect_cid: Some(cid),
                },
                None => ParsedLine::UNKNOWN,
            }
        }

        // Async-only codes never end a synchronous reply
        _ => ParsedLine::UNKNOWN,
    }
}

/// Reply line accumulator over a caller-provided buffer
///
/// Completed data lines that the caller wants to keep stay in the buffer,
/// each terminated by `\r\n`, in front of the line being received. When the
/// buffer fills up:
///
/// - a line already longer than [`MAX_RESPONSE_SIZE`] cannot be a reply
///   code, so its remaining bytes are skipped;
/// - otherwise the last byte of the kept data is evicted to make room, and
///   from then on no further data lines are kept, so the result is cleanly
///   truncated instead of having gaps.
#[derive(Debug)]
pub struct LineBuffer<'a> {
    buf: &'a mut [u8],
    read: usize,
    line_start: usize,
    truncated: bool,
    skip_line: bool,
}

impl<'a> LineBuffer<'a> {
    /// Wrap `buf`
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            read: 0,
            line_start: 0,
            truncated: false,
            skip_line: false,
        }
    }

    /// The line being received
    pub fn line(&self) -> &[u8] {
        &self.buf[self.line_start..self.read]
    }

    /// Kept data (all completed lines kept so far)
    pub fn kept(&self) -> &[u8] {
        &self.buf[..self.line_start]
    }

    /// Bytes in use, kept data plus the current line
    pub fn len(&self) -> usize {
        self.read
    }

    /// Nothing kept and no current line
    pub fn is_empty(&self) -> bool {
        self.read == 0
    }

    /// Some data was lost to buffer pressure
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Append one byte to the current line
    pub fn push(&mut self, byte: u8) {
        if self.read < self.buf.len() {
            self.buf[self.read] = byte;
            self.read += 1;
        } else if self.read - self.line_start >= MAX_RESPONSE_SIZE {
            log::trace!("Response buffer full, dropped byte 0x{:02x}", byte);
            self.skip_line = true;
            self.truncated = true;
        } else if self.line_start > 0 {
            log::warn!(
                "Response buffer full, evicted byte 0x{:02x}",
                self.buf[self.line_start - 1]
            );
            self.buf.copy_within(self.line_start..self.read, self.line_start - 1);
            self.line_start -= 1;
            self.buf[self.read - 1] = byte;
            self.truncated = true;
        } else {
            log::warn!("Response buffer too small, dropped byte 0x{:02x}", byte);
            self.truncated = true;
        }
    }

    /// Whether the current line lost bytes and must not be parsed
    ///
    /// Clears the flag and discards the line when set.
    pub fn take_skipped(&mut self) -> bool {
        if self.skip_line {
            self.skip_line = false;
            self.read = self.line_start;
            true
        } else {
            false
        }
    }

    /// Close the current line
    ///
    /// With `keep` (and nothing lost so far) the line stays in the buffer
    /// followed by `\r\n`; otherwise it is discarded.
    pub fn finish_line(&mut self, keep: bool) {
        if keep && !self.truncated {
            for &b in b"\r\n" {
                if self.read < self.buf.len() {
                    self.buf[self.read] = b;
                    self.read += 1;
                }
            }
            self.line_start = self.read;
        } else {
            self.read = self.line_start;
        }
    }
}
