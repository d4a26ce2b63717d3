// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use crate::hal::TimeProvider;

/// Host (desktop) clock backed by `std::time::Instant`
///
/// Used by replay tools and host-side tests where the module is reached
/// through a USB-serial bridge.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    origin: Instant,
}

impl HostClock {
    /// Create a clock whose epoch is "now"
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for HostClock {
    fn get_time_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_clock_is_monotonic() {
        let clock = HostClock::new();
        let a = clock.get_time_us();
        let b = clock.get_time_us();
        assert!(b >= a);
    }
}
