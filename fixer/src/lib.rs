//! Autonomous fix-and-regression-safety engine for automated UI tests.
//!
//! When a test fails, the engine asks a generative backend for a candidate
//! fix, applies it, and verifies the full regression picture before keeping
//! it. Anything it cannot safely fix lands in a durable, priority-ordered
//! escalation queue for human review. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (comparison, priority scoring,
//!   proposal parsing, diff rendering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, durable store,
//!   escalation queue, artifacts). Isolated behind traits to enable scripted
//!   fakes in tests.
//!
//! [`controller`] coordinates core logic with I/O to implement one
//! fix-attempt pass.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
