//! I/O helpers for the fix engine.

pub mod artifact;
pub mod attempts;
pub mod config;
pub mod generator;
pub mod hints;
pub mod learning;
pub mod process;
pub mod queue;
pub mod regression;
pub mod store;
