//! Tracing bootstrap for Mediary binaries and tests.
//!
//! Initialization is idempotent so libraries, binaries, and test
//! harnesses can all call [`init_tracing`] without coordinating.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize the global tracing subscriber.
///
/// Reads the filter from `RUST_LOG`, falling back to `info`. Subsequent
/// calls are no-ops, including the case where another subscriber was
/// already installed by the embedding application.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // try_init tolerates a subscriber installed by the host process
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
