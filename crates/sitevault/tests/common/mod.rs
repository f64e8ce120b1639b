//! Shared test utilities for sitevault integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an in-memory database, a site snapshot and config
//! - Builders for schemas, plugin maps and backup manifests

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
pub use sitevault::runner::Runnable;
pub use sitevault::{Check, Tool};
