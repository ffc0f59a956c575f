//! Deterministic, pure logic shared by the fix engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod compare;
pub mod diff;
pub mod priority;
pub mod proposal;
pub mod types;
