// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # gainspan-observability
//!
//! Logging setup for host tools that drive the protocol engine.
//!
//! The engine crates log through the `log` facade; this crate installs a
//! `tracing` subscriber that picks those records up, filtered per crate by
//! `--debug-<crate>` flags or `GAINSPAN_DEBUG`.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "gainspan",
    "gainspan-core",
    "gainspan-hal",
    "gainspan-config",
    "gs_replay",
];
