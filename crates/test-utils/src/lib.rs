//! Shared test utilities for the GRIB acquisition workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Scratch output directories
//! - Files with back-dated modification times
//! - Deterministic slice payloads
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../../crates/test-utils" }
//! ```

pub mod fixtures;

pub use fixtures::*;

/// Seconds in one day, for building file ages.
pub const DAY_SECS: u64 = 24 * 60 * 60;
