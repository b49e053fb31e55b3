//! Shared utilities for the texsense integration tests
//!
//! Every test runs the binary against a LaTeX project in a temporary
//! directory, with config and cache directories isolated per test.

pub mod assertions;
pub mod fixtures;
