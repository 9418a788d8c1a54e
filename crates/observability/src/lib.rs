//! Process-wide tracing setup shared by every binary in the workspace.

pub mod logging;

pub use logging::LogFormat;

/// Initialize tracing from the environment (`RUST_LOG`, `LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init(LogFormat::from_env());
}
