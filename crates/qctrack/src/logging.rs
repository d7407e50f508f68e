//! Logging setup for qctrack.
//!
//! Installs a tracing subscriber whose default filter is derived from the CLI
//! verbosity flags. `RUST_LOG` always wins when it is set.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directives used when `RUST_LOG` is not set.
    ///
    /// Framework crates stay at `warn` unless tracing everything, so request
    /// logs from our own middleware are not drowned out.
    #[must_use]
    pub fn default_directives(&self) -> String {
        let own = self.to_level_filter();
        let deps = match self {
            Self::Trace => Level::TRACE,
            Self::Quiet => Level::ERROR,
            Self::Normal | Self::Verbose => Level::WARN,
        };
        format!("qctrack={own},axum={deps},hyper={deps}")
    }
}

/// Initialize the logging system.
///
/// This should be called once at application startup.
///
/// ```no_run
/// use qctrack::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directives()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // A subscriber may already be installed (tests, embedding)
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::Normal.to_level_filter(), Level::INFO);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_default_directives_normal() {
        assert_eq!(
            Verbosity::Normal.default_directives(),
            "qctrack=INFO,axum=WARN,hyper=WARN"
        );
    }

    #[test]
    fn test_default_directives_trace_opens_dependencies() {
        let directives = Verbosity::Trace.default_directives();
        assert!(directives.contains("qctrack=TRACE"));
        assert!(directives.contains("axum=TRACE"));
    }

    #[test]
    fn test_default_directives_parse() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Trace,
        ] {
            assert!(EnvFilter::try_new(verbosity.default_directives()).is_ok());
        }
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Normal);
    }
}
