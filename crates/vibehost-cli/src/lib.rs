//! Shared pieces of the `vibehost` and `vibehost-server` binaries

pub mod commands;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vibehost_core::CoreError;

/// Install the tracing subscriber. Logs go to stderr; stdout carries replies.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Exit code for an error surfaced at the binary boundary
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CoreError>()
        .map(CoreError::exit_code)
        .unwrap_or(1)
}
