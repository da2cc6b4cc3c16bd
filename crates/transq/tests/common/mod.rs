//! Shared test utilities for transq integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated tests over a file database in a temp directory
//! - `ScriptedTranslator`, a provider double with canned answers and failures
//! - Builder patterns for creating test settings programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{ScriptedTranslator, TestHarness};
