// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Platform implementations of the HAL traits

#[cfg(feature = "std")]
mod host;

#[cfg(feature = "std")]
pub use host::HostClock;
