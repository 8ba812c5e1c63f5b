//! Tracing subscriber setup.
//!
//! Logs always go to stderr; stdout carries the stdio protocol stream.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Config, LogFormat};
use crate::error::{Error, Result};

/// Filter from `RUST_LOG`, else `debug`/`info` depending on `--debug`.
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { "debug" } else { "info" })
    })
}

/// Install the global subscriber.
pub fn init(config: &Config) -> Result<()> {
    let builder = fmt()
        .with_env_filter(env_filter(config.debug))
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.log_format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| Error::Config(format!("failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_levels() {
        // RUST_LOG is unset under `cargo test` unless the caller exports it.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter(true).to_string(), "debug");
            assert_eq!(env_filter(false).to_string(), "info");
        }
    }
}
