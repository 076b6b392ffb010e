// HTTP transport configuration

use std::time::Duration;

/// Transport configuration: where requests go and how long they may take.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Base URL for API requests
    pub base_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            base_url: "https://rest.ably.io".to_string(),
        }
    }
}

impl HttpConfig {
    /// Create a new configuration builder
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }
}

/// HTTP configuration builder
#[derive(Default)]
pub struct HttpConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    base_url: Option<String>,
}

impl HttpConfigBuilder {
    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> HttpConfig {
        let default = HttpConfig::default();
        HttpConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(default.connect_timeout),
            base_url: self.base_url.unwrap_or(default.base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_what_is_set() {
        let config = HttpConfig::builder()
            .timeout(Duration::from_secs(3))
            .base_url("https://sandbox.example.com")
            .build();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, HttpConfig::default().connect_timeout);
        assert_eq!(config.base_url, "https://sandbox.example.com");
    }
}
