//! Tracing subscriber installation.
//!
//! Engines log movement applications at `debug`, committed transitions at
//! `info`, and low-stock or coalescing events at `warn`; this wires those
//! streams into structured JSON on stdout.

use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`. Uses `try_init` so repeated
/// calls (library tests, embedders that already installed one) are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn repeated_init_is_a_no_op() {
        super::init();
        super::init();
    }
}
