//! Log subscriber setup for the CLI.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, writing to stderr.
///
/// JSON lines at `info` by default; `verbose` switches to the compact
/// console format at `debug`. `RUST_LOG` overrides the level either way.
/// Calling this twice is harmless.
pub fn init(verbose: bool) {
    let default_level = if verbose { "roam2md=debug" } else { "roam2md=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = if verbose {
        builder.compact().try_init()
    } else {
        builder.json().try_init()
    };
}
