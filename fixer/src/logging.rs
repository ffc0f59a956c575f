//! Two distinct logging systems exist in this crate:
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to
//!   stderr. Not persisted, not part of fixer product output.
//! - **Fix artifacts (`io/artifact`)**: Product artifacts in
//!   `.fixer/artifacts/`. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=fixer=debug cargo run -- fix tests/login.spec.ts --error "..."
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
