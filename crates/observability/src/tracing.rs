//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Build the filter: `RUST_LOG` wins, then the configured level, then "info".
pub fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &LoggingConfig) {
    let filter = filter_for(config);

    if config.json {
        // JSON logs + timestamps.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_a_no_op() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            json: false,
        };
        init(&config);
        init(&config);
    }

    #[test]
    fn bad_directive_falls_back() {
        let config = LoggingConfig {
            level: "[[not a directive".to_string(),
            json: true,
        };
        // Must not panic.
        let _ = filter_for(&config);
    }
}
