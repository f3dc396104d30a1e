//! Shared test utilities for placetap integration tests.
//!
//! This module provides:
//! - `TestHarness` with a file-backed database and the queue components wired up
//! - Builders for job requests, query grids and place records

pub mod builders;
pub mod harness;

#[allow(unused_imports)]
pub use builders::*;
pub use harness::TestHarness;
