//! Logger setup shared by the binaries.

use log::LevelFilter;

/// Level used when `RUST_LOG` is unset
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialises `env_logger` with second-resolution timestamps.
///
/// `RUST_LOG` takes precedence over `verbose`. Calling this twice is a no-op.
pub fn init_logging(verbose: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level(verbose))
        .parse_default_env()
        .format_timestamp_secs()
        .try_init();
}
