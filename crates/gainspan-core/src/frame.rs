// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection ids and bulk frame headers

use core::fmt;
use core::net::Ipv4Addr;

/// Highest connection id the module hands out
pub const MAX_CID: u8 = 15;

/// Number of connection slots
pub const CID_COUNT: usize = MAX_CID as usize + 1;

/// Largest payload of a single bulk data frame (module limit)
pub const MAX_BULK_CHUNK: usize = 1400;

/// Connection id (`0..=MAX_CID`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid(u8);

impl Cid {
    /// Validate a raw connection id
    pub const fn new(raw: u8) -> Option<Self> {
        if raw <= MAX_CID {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Connection id from the low bits of a packed byte
    pub(crate) const fn from_low_bits(raw: u8) -> Self {
        Self(raw & MAX_CID)
    }

    /// Raw numeric id
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Index into per-connection tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Every valid connection id, in ascending order
    pub fn all() -> impl Iterator<Item = Cid> {
        (0..=MAX_CID).map(Cid)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Cid {
    type Error = crate::error::EngineError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Cid::new(raw).ok_or(crate::error::EngineError::InvalidCid)
    }
}

/// Header of one bulk data frame
///
/// `length` counts the payload bytes of this frame that have not been
/// consumed yet; it only ever decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    /// Connection the payload belongs to
    pub cid: Cid,
    /// Remaining payload bytes
    pub length: u16,
    /// Received on a UDP server socket (`<ESC>y`)
    pub udp_server: bool,
    /// Sender address, only for UDP server frames
    pub remote: Option<(Ipv4Addr, u16)>,
}

impl RxFrame {
    /// Header of a TCP or UDP client frame (`<ESC>Z`)
    pub const fn client(cid: Cid, length: u16) -> Self {
        Self {
            cid,
            length,
            udp_server: false,
            remote: None,
        }
    }

    /// Header of a UDP server frame (`<ESC>y`)
    pub const fn udp_server(cid: Cid, length: u16, ip: Ipv4Addr, port: u16) -> Self {
        Self {
            cid,
            length,
            udp_server: true,
            remote: Some((ip, port)),
        }
    }

    /// All payload consumed
    pub const fn is_done(&self) -> bool {
        self.length == 0
    }
}
