// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-width ASCII number and dotted-quad address parsing
//!
//! Every header field and async argument the module sends is a short ASCII
//! number with a known width and radix. These helpers look at exactly the
//! slice they are given, never beyond it, and reject anything that does not
//! fit the destination type.

use core::net::Ipv4Addr;

/// Radix of an ASCII number field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    /// Base 10 (lengths, ports, octets)
    Decimal,
    /// Base 16 (CIDs, async subtypes)
    Hex,
}

impl Radix {
    fn base(self) -> u32 {
        match self {
            Radix::Decimal => 10,
            Radix::Hex => 16,
        }
    }
}

/// Parse `digits` as an unsigned number in `radix`
///
/// The digit count is the slice length; an empty slice is rejected. Fails
/// on any non-digit byte, on digits outside the radix, and when the value
/// does not fit in `T`.
///
/// # Example
/// ```
/// use gainspan_core::numeric::{parse_number, Radix};
///
/// assert_eq!(parse_number::<u16>(b"0042", Radix::Decimal), Some(42));
/// assert_eq!(parse_number::<u8>(b"c", Radix::Hex), Some(12));
/// assert_eq!(parse_number::<u8>(b"256", Radix::Decimal), None);
/// ```
pub fn parse_number<T: TryFrom<u32>>(digits: &[u8], radix: Radix) -> Option<T> {
    if digits.is_empty() {
        return None;
    }

    let base = radix.base();
    let mut value: u32 = 0;
    for &byte in digits {
        let digit = (byte as char).to_digit(base)?;
        value = value.checked_mul(base)?.checked_add(digit)?;
    }
    T::try_from(value).ok()
}

/// Parse a dotted-quad IPv4 address such as `192.168.1.10`
///
/// Exactly four octets of one to three decimal digits are required; an
/// octet of 256 or more, an empty octet, a fifth octet or any other byte
/// rejects the whole address.
pub fn parse_ipv4(text: &[u8]) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut count = 0;

    for part in text.split(|&b| b == b'.') {
        if count == octets.len() || part.len() > 3 {
            return None;
        }
        octets[count] = parse_number(part, Radix::Decimal)?;
        count += 1;
    }

    if count != octets.len() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}
