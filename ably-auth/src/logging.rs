// Logging setup for the auth core

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the
/// configured filter. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    // Already-initialized is fine, e.g. when multiple tests set this up.
    let _ = result;
}

/// Redact a secret for log output, keeping only the length.
pub fn redact(value: &str) -> String {
    format!("[REDACTED {} bytes]", value.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redaction_hides_value() {
        let redacted = redact("s3cr3t");
        assert!(!redacted.contains("s3cr3t"));
        assert!(redacted.contains('6'));
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(&LogConfig::default());
        init_logging(&LogConfig {
            filter: "debug".to_string(),
            json: true,
        });
    }
}
