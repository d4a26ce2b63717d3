// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Monotonic time abstraction for embedded platforms
pub trait TimeProvider {
    /// Get current time in microseconds since system boot
    ///
    /// # Returns
    /// Monotonic timestamp in microseconds
    fn get_time_us(&self) -> u64;

    /// Get current time in milliseconds since system boot
    fn get_time_ms(&self) -> u64 {
        self.get_time_us() / 1000
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for &T {
    fn get_time_us(&self) -> u64 {
        (**self).get_time_us()
    }
}
