//! Log output for the `gatehouse` binary.
//!
//! Gate reports own stdout, so every log line goes to stderr. `RUST_LOG`
//! overrides the level picked from the command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber, as JSON lines when `json` is set.
///
/// A subscriber that is already installed wins; this call then does nothing.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let (text, lines) = if json {
        (
            None,
            Some(fmt::layer().with_target(false).with_writer(std::io::stderr).json()),
        )
    } else {
        (
            Some(fmt::layer().with_target(false).with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(lines)
        .try_init()
        .ok();
}
