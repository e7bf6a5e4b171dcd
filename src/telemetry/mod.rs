//! Logging setup and metrics
//!
//! Executors log through `tracing` and count through the Prometheus default
//! registry. Binaries and tests call [`init_tracing`] once to see the logs.

use tracing_subscriber::EnvFilter;

pub mod metrics;

pub use metrics::{export_metrics, ExecutorKind, ExecutorMetrics, Timer};

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
