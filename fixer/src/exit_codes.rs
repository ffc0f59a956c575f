//! Stable exit codes for fixer CLI commands.

/// Fix applied and verified, or command succeeded.
pub const OK: i32 = 0;
/// Command failed: bad arguments, store errors, or an aborted fix pass.
pub const FAILURE: i32 = 1;
/// `fixer fix` escalated the task to the human-review queue.
pub const ESCALATED: i32 = 2;
