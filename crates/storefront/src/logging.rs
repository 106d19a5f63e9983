//! Log setup for test binaries.
//!
//! Interaction steps log at `debug`, fallbacks and swallowed capture errors at
//! `warn`. Call [`init`] at the start of a test; repeated calls are no-ops.
//! The filter comes from `RUST_LOG` (default `info`), and
//! `STOREFRONT_LOG_FORMAT=json` switches to one JSON object per line.

use tracing_subscriber::EnvFilter;

/// Variable selecting the output format
pub const LOG_FORMAT_VAR: &str = "STOREFRONT_LOG_FORMAT";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl LogFormat {
    /// Format named by `STOREFRONT_LOG_FORMAT`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_name(std::env::var(LOG_FORMAT_VAR).ok().as_deref())
    }

    fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(name) if name.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global subscriber, writing through the test harness
pub fn init() {
    init_with(LogFormat::from_env());
}

/// Install the global subscriber with an explicit format
pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(false);
    // Another test in the same binary may have installed one already.
    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name() {
        assert_eq!(LogFormat::from_name(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_name(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_name(None), LogFormat::Pretty);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_with(LogFormat::Pretty);
        init_with(LogFormat::Json);
        tracing::info!("still logging");
    }
}
