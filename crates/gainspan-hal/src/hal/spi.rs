// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Full-duplex single-byte SPI exchange with the module
///
/// The module ignores every byte after the first one inside a chip-select
/// window (it answers `0xff`), so each call must assert and release chip
/// select around exactly one byte.
pub trait SpiExchange {
    /// Platform-specific error type
    type Error: core::fmt::Debug;

    /// Clock out `out` and return the byte clocked in at the same time
    fn exchange(&mut self, out: u8) -> Result<u8, Self::Error>;
}

impl<S: SpiExchange + ?Sized> SpiExchange for &mut S {
    type Error = S::Error;

    fn exchange(&mut self, out: u8) -> Result<u8, Self::Error> {
        (**self).exchange(out)
    }
}

/// Adapter for an `embedded_hal::spi::SpiDevice`
///
/// `SpiDevice` owns chip select and toggles it around every transaction, so
/// a one-byte transaction gives the per-byte framing the module requires.
#[cfg(feature = "embedded-hal")]
pub struct EhSpi<D>(pub D);

#[cfg(feature = "embedded-hal")]
impl<D: embedded_hal::spi::SpiDevice> SpiExchange for EhSpi<D> {
    type Error = D::Error;

    fn exchange(&mut self, out: u8) -> Result<u8, Self::Error> {
        let mut word = [out];
        self.0.transfer_in_place(&mut word)?;
        Ok(word[0])
    }
}
