//! Process-wide logging setup shared by binaries, tests, and embedders.

/// Initialize tracing for the process.
///
/// Safe to call more than once; subsequent calls become no-ops, so library
/// tests and embedding applications can both call it freely.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filter, JSON output).
pub mod tracing;
