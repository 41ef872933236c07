//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` plus a `fmt`
//! layer in pretty or JSON form. Output goes to stderr so stdout stays
//! clean for `status` and `keygen` output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Filter directive for a bare level such as `info`: the level applies to
/// the Satox crates, `tower_http` request traces stay at `debug`.
pub fn default_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    format!("satox={level},satox_sdk={level},tower_http=debug")
}

/// Initialize the global subscriber. Call once, early in `main()`.
///
/// `RUST_LOG` overrides `default_level` when set.
pub fn init_logging(default_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .init();
        }
    }

    tracing::debug!(?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_expand_to_crate_directives() {
        assert_eq!(
            default_directive("debug"),
            "satox=debug,satox_sdk=debug,tower_http=debug"
        );
        assert_eq!(
            default_directive(""),
            "satox=info,satox_sdk=info,tower_http=debug"
        );
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(default_directive("satox_sdk=trace"), "satox_sdk=trace");
    }
}
