// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Optional data-ready input from the module (GPIO28 on the GS1011)
///
/// When wired, the module drives it high while it has bytes queued for the
/// host, which lets SPI reads skip polling entirely while it is low.
pub trait DataReadyPin {
    /// Whether a pin is actually connected
    ///
    /// Returns `false` for [`NoDataReadyPin`], in which case the SPI link
    /// falls back to paced polling.
    fn is_connected(&self) -> bool {
        true
    }

    /// Read the current level of the signal
    fn is_ready(&mut self) -> bool;
}

/// Placeholder used when the data-ready signal is not wired
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDataReadyPin;

impl DataReadyPin for NoDataReadyPin {
    fn is_connected(&self) -> bool {
        false
    }

    fn is_ready(&mut self) -> bool {
        true
    }
}

/// Adapter for an `embedded_hal::digital::InputPin`
///
/// Read errors are reported as "ready" so the link keeps polling instead of
/// silently stalling.
#[cfg(feature = "embedded-hal")]
pub struct EhDataReady<P>(pub P);

#[cfg(feature = "embedded-hal")]
impl<P: embedded_hal::digital::InputPin> DataReadyPin for EhDataReady<P> {
    fn is_ready(&mut self) -> bool {
        self.0.is_high().unwrap_or(true)
    }
}
