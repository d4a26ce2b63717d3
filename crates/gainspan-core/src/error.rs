// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for engine operations

use core::fmt;

use crate::response::ResponseCode;

#[cfg(feature = "std")]
extern crate std;

/// Transport-level failures
///
/// Every one of these latches the engine fault: after a link error the byte
/// stream framing can no longer be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// More than 20 consecutive all-ones bytes on SPI (module fell off the bus)
    DeadLink,

    /// The module kept XOFF asserted for the whole write retry budget
    Stalled,

    /// The underlying port or SPI peripheral reported an error
    Transport,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::DeadLink => write!(f, "SPI link dead (module stopped driving the bus)"),
            LinkError::Stalled => write!(f, "Module held XOFF for the whole retry budget"),
            LinkError::Transport => write!(f, "Transport error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LinkError {}

/// Engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// `begin`/`attach` called on a running engine
    AlreadyStarted,

    /// Operation needs a running engine
    NotStarted,

    /// The fault latch is set; call `end` and start again
    Fault,

    /// No reply within the response timeout (also latches the fault)
    Timeout,

    /// Connection id outside `0..=MAX_CID`
    InvalidCid,

    /// Payload larger than a single frame may carry
    PayloadTooLarge {
        /// Requested length
        len: usize,
        /// Largest accepted length
        max: usize,
    },

    /// Reply buffer cannot hold a reply code
    BufferTooSmall {
        /// Length of the caller's buffer
        len: usize,
        /// Smallest usable length
        min: usize,
    },

    /// The module answered `<ESC>F` to a bulk write
    WriteRejected,

    /// A command got a reply other than SUCCESS
    CommandFailed(ResponseCode),

    /// No start-up banner within the response timeout
    BannerTimeout,

    /// Transport failure
    Link(LinkError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AlreadyStarted => write!(f, "Engine already started"),
            EngineError::NotStarted => write!(f, "Engine not started"),
            EngineError::Fault => write!(f, "Engine in unrecoverable fault state"),
            EngineError::Timeout => write!(f, "Response timeout"),
            EngineError::InvalidCid => write!(f, "Invalid connection id"),
            EngineError::PayloadTooLarge { len, max } => {
                write!(f, "Payload too large: {} bytes, max {}", len, max)
            }
            EngineError::BufferTooSmall { len, min } => {
                write!(f, "Reply buffer too small: {} bytes, need {}", len, min)
            }
            EngineError::WriteRejected => write!(f, "Module rejected bulk data frame"),
            EngineError::CommandFailed(code) => write!(f, "Command failed: {:?}", code),
            EngineError::BannerTimeout => write!(f, "Startup banner timeout"),
            EngineError::Link(e) => write!(f, "Link error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Link(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinkError> for EngineError {
    fn from(e: LinkError) -> Self {
        EngineError::Link(e)
    }
}

/// Result type for engine operations
pub type Result<T> = core::result::Result<T, EngineError>;
