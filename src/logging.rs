//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding per-module log levels,
/// e.g. `QLRUN_LOG=qlrun::analyze=debug,qlrun::engine=trace`.
pub const LOG_ENV: &str = "QLRUN_LOG";

static INIT: Once = Once::new();

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "qlrun=debug"
    } else {
        "qlrun=info"
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// machine-readable.
///
/// Falls back to `qlrun=info` (`qlrun=debug` with `debug`) when `QLRUN_LOG`
/// is unset or invalid. Later calls are no-ops.
pub fn init_tracing(debug: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(debug),
            )
            .with(filter)
            .init();
    });
}
