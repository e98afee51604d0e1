use tracing_subscriber::EnvFilter;

use crate::config::WardenConfig;

const DEFAULT_FILTER: &str = "info,warden=debug";

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `info,warden=debug`.
/// Set `logging.json: true` to emit JSON lines instead of the pretty format.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(config: &WardenConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = config.get_or("logging.json", false).unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
