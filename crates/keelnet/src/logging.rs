//! Tracing bootstrap for Keelnet binaries.
//!
//! Libraries only emit `tracing` events; a binary calls [`init_tracing`]
//! once at startup to print them.
//!
//! ```ignore
//! keelnet::logging::init_tracing(LogConfig::default())?;
//! ```
//!
//! `RUST_LOG` overrides the configured directive when it is set.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to install global tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"keelnet_transport=debug,info"`.
    pub default_directive: String,
    pub format: LogFormat,
    /// Print the emitting module path.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Per-frame detail: `trace` for Keelnet crates, `info` for the rest.
    pub fn verbose() -> Self {
        Self {
            default_directive: "info,keelnet=trace,keelnet_transport=trace,keelnet_protocol=trace"
                .to_string(),
            format: LogFormat::Compact,
            include_target: true,
        }
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.default_directive)?),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
/// [`LoggingError::Filter`] for a malformed directive and
/// [`LoggingError::Install`] if a subscriber is already installed.
pub fn init_tracing(config: LogConfig) -> Result<(), LoggingError> {
    let filter = config.filter()?;

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(config.include_target))
            .try_init()?,
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(config.include_target))
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_directive_replaces_default() {
        let config = LogConfig::default().with_directive("keelnet=debug");
        assert_eq!(config.default_directive, "keelnet=debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_filter_accepts_verbose_directive() {
        assert!(EnvFilter::try_new(LogConfig::verbose().default_directive).is_ok());
    }

    #[test]
    fn test_init_tracing_twice_reports_error() {
        // The first call may lose to another test in this binary; the
        // second one must fail either way.
        let _ = init_tracing(LogConfig::default());
        let second = init_tracing(LogConfig::default());
        assert!(matches!(second, Err(LoggingError::Install(_))));
    }
}
