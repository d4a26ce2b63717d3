// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// UART-style byte port connected to the module
///
/// The engine consumes the receive side one byte at a time and never blocks
/// on it, so implementations should return `Ok(None)` as soon as their RX
/// FIFO is empty.
pub trait SerialPort {
    /// Platform-specific error type
    type Error: core::fmt::Debug;

    /// Read one byte (non-blocking)
    ///
    /// # Returns
    /// `Some(byte)` if a byte was waiting, `None` if the receive FIFO is empty
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Write bytes to the port
    ///
    /// # Arguments
    /// * `data` - Bytes to write
    ///
    /// # Returns
    /// Number of bytes accepted (may be less than `data.len()`) or error
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush output buffer
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<S: SerialPort + ?Sized> SerialPort for &mut S {
    type Error = S::Error;

    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        (**self).read_byte()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        (**self).flush()
    }
}
