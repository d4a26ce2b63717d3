// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous notification parsing and dispatch
//!
//! With `AT+ASYNCMSGFMT=1` the module reports lifecycle changes as
//! `<ESC>A<subtype><len><payload>`, where the payload repeats the subtype
//! digit followed by space-separated arguments. Anything that does not match
//! the expected shape exactly is discarded.

use core::net::Ipv4Addr;

use crate::connection::ConnectionTable;
use crate::frame::Cid;
use crate::numeric::{parse_number, Radix};
use crate::rx::AsyncMessage;

/// Async notification subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AsyncKind {
    /// `ERROR: SOCKET FAILURE <cid>`
    SockFail = 0x0,
    /// `CONNECT <cid>`
    ConSuccess = 0x1,
    /// `DISCONNECT <cid>`
    CidClose = 0x2,
    /// Disassociation event
    Disassociated = 0x3,
    /// Out of standby (timer)
    StandbyTimer = 0x4,
    /// Out of standby (alarm)
    StandbyAlarm = 0x5,
    /// Out of deep sleep
    DeepSleep = 0x6,
    /// Unexpected warm boot (possibly low battery)
    BootUnexpected = 0x7,
    /// `ERROR: IP CONFIG FAIL`
    IpConfigFail = 0x8,
    /// Boot, internal PA firmware
    BootInternal = 0x9,
    /// Boot, external PA firmware
    BootExternal = 0xA,
    /// Connection manager gave up
    Failure = 0xB,
    /// `NWCONN-SUCCESS`
    NetworkConnected = 0xC,
}

impl AsyncKind {
    /// Map a subtype number to its variant
    pub const fn from_subtype(subtype: u8) -> Option<Self> {
        Some(match subtype {
            0x0 => AsyncKind::SockFail,
            0x1 => AsyncKind::ConSuccess,
            0x2 => AsyncKind::CidClose,
            0x3 => AsyncKind::Disassociated,
            0x4 => AsyncKind::StandbyTimer,
            0x5 => AsyncKind::StandbyAlarm,
            0x6 => AsyncKind::DeepSleep,
            0x7 => AsyncKind::BootUnexpected,
            0x8 => AsyncKind::IpConfigFail,
            0x9 => AsyncKind::BootInternal,
            0xA => AsyncKind::BootExternal,
            0xB => AsyncKind::Failure,
            0xC => AsyncKind::NetworkConnected,
            _ => return None,
        })
    }
}

/// A validated async notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEvent {
    /// Socket broke, data may have been lost
    SocketFailure(Cid),
    /// Connection manager opened its connection
    Connected(Cid),
    /// Connection closed
    Disconnected(Cid),
    /// Association lost
    Disassociated,
    /// Standby or deep-sleep wake-up (informational)
    Wakeup(AsyncKind),
    /// Module booted (banner kind)
    Boot(AsyncKind),
    /// DHCP failed; the module lost its address
    IpConfigFailed,
    /// Connection manager exhausted its retries
    ConnectFailed,
    /// Connection manager associated
    Associated,
}

/// Validate an async message
///
/// Returns `None` (after logging) for unknown subtypes, a payload subtype
/// that does not repeat the header's, or malformed arguments. The
/// multi-field incoming-connection form of `CONNECT` is not supported.
pub fn parse_async(msg: &AsyncMessage) -> Option<AsyncEvent> {
    let event = parse_async_inner(msg);
    if event.is_none() {
        log::warn!(
            "Unknown async response: subtype={}, length={}, data={:?}",
            msg.subtype,
            msg.payload.len(),
            core::str::from_utf8(&msg.payload).unwrap_or("<binary>")
        );
    }
    event
}

fn parse_async_inner(msg: &AsyncMessage) -> Option<AsyncEvent> {
    if msg.overflowed {
        return None;
    }
    let kind = AsyncKind::from_subtype(msg.subtype)?;

    let (digit, args) = msg.payload.split_first()?;
    if parse_number::<u8>(core::slice::from_ref(digit), Radix::Hex)? != msg.subtype {
        return None;
    }
    if !args.is_empty() && args[0] != b' ' {
        return None;
    }

    let cid_arg = || {
        if args.len() == 2 {
            parse_number(&args[1..], Radix::Hex).and_then(Cid::new)
        } else {
            None
        }
    };

    match kind {
        AsyncKind::SockFail => cid_arg().map(AsyncEvent::SocketFailure),
        AsyncKind::CidClose => cid_arg().map(AsyncEvent::Disconnected),
        AsyncKind::ConSuccess => cid_arg().map(AsyncEvent::Connected),
        _ if !args.is_empty() => None,
        AsyncKind::Disassociated => Some(AsyncEvent::Disassociated),
        AsyncKind::StandbyTimer | AsyncKind::StandbyAlarm | AsyncKind::DeepSleep => {
            Some(AsyncEvent::Wakeup(kind))
        }
        AsyncKind::BootUnexpected | AsyncKind::BootInternal | AsyncKind::BootExternal => {
            Some(AsyncEvent::Boot(kind))
        }
        AsyncKind::IpConfigFail => Some(AsyncEvent::IpConfigFailed),
        AsyncKind::Failure => Some(AsyncEvent::ConnectFailed),
        AsyncKind::NetworkConnected => Some(AsyncEvent::Associated),
    }
}

/// Outcome of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// State updated (or nothing to update)
    Handled,
    /// The module rebooted outside of start-up; the caller must reinitialize
    UnexpectedReset,
}

/// Apply an event to the connection table
///
/// Boot notifications are expected while `initializing` and ignored then.
pub fn dispatch(event: AsyncEvent, table: &mut ConnectionTable, initializing: bool) -> Dispatch {
    match event {
        AsyncEvent::SocketFailure(cid) => {
            log::warn!("Socket error on cid {}", cid);
            table.mark_error(cid);
            table.disconnect(cid);
        }
        AsyncEvent::Connected(cid) => {
            log::debug!("Connection manager connected cid {}", cid);
            table.connect(cid, Ipv4Addr::UNSPECIFIED, 0, 0, true);
        }
        AsyncEvent::Disconnected(cid) => {
            log::debug!("Disconnected cid {}", cid);
            table.disconnect(cid);
        }
        AsyncEvent::Disassociated | AsyncEvent::IpConfigFailed => {
            log::debug!("Disassociated ({:?})", event);
            table.disassociate();
        }
        AsyncEvent::Associated => {
            log::debug!("Associated");
            table.associate();
        }
        AsyncEvent::Wakeup(kind) => {
            log::debug!("Ignoring wake-up notification {:?}", kind);
        }
        AsyncEvent::ConnectFailed => {
            log::warn!("Connection manager gave up connecting");
        }
        AsyncEvent::Boot(kind) => {
            if !initializing {
                log::error!("Unexpected module reset ({:?})", kind);
                return Dispatch::UnexpectedReset;
            }
            log::debug!("Boot notification during start-up ({:?})", kind);
        }
    }
    Dispatch::Handled
}
