//! Logging setup.
//!
//! Logs go to stderr; stdout carries run output. `--debug` forces the
//! `debug` level, otherwise `RUST_LOG` takes precedence over the configured
//! level.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: &LoggingConfig, debug: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(config, debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn filter(config: &LoggingConfig, debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::try_new(&config.level).unwrap_or_else(|e| {
        eprintln!("rewatch: ignoring log level {:?}: {e}", config.level);
        EnvFilter::new("warn")
    })
}
