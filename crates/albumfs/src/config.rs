//! Mount and service configuration.
//!
//! Two builders: [`MountConfig`] controls what the filesystem surface allows,
//! [`ServiceConfig`] controls how the remote AtomPub service is reached.

use std::time::Duration;

/// Default service document URL.
pub const DEFAULT_SERVICE_URL: &str = "https://api-fotki.yandex.ru/api/me/";

/// Default id of the album collection in the service document.
pub const DEFAULT_COLLECTION_ID: &str = "album-list";

/// Default authorization scheme: `Authorization: OAuth <token>`.
pub const DEFAULT_AUTH_SCHEME: &str = "OAuth";

/// Default number of additional attempts after a transient failure: 3
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between attempts: 5 seconds
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default per-request timeout: 60 seconds
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum response body size: 64 MiB
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Title the service assigns to photos uploaded without one.
pub const DEFAULT_PLACEHOLDER_TITLE: &str = "Untitled";

/// Filesystem surface options.
///
/// # Example
///
/// ```rust
/// use albumfs::MountConfig;
///
/// let config = MountConfig::new().allow_destructive(true);
/// assert!(config.allow_destructive);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    /// Allow `rmdir` and `unlink` to delete remote albums and photos.
    /// Default: false
    pub allow_destructive: bool,
}

impl MountConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_destructive(mut self, allow: bool) -> Self {
        self.allow_destructive = allow;
        self
    }
}

/// Remote service options.
///
/// # Defaults
///
/// | Option | Default | Purpose |
/// |--------|---------|---------|
/// | `service_url` | `https://api-fotki.yandex.ru/api/me/` | Service document |
/// | `collection_id` | `album-list` | Album collection in the service document |
/// | `auth_scheme` | `OAuth` | Authorization header scheme |
/// | `max_retries` | 3 | Extra attempts on transient failures |
/// | `retry_delay` | 5s | Fixed delay between attempts |
/// | `timeout` | 60s | Per-request timeout |
/// | `max_response_bytes` | 64 MiB | Response body cap |
/// | `placeholder_title` | `Untitled` | Titles treated as missing |
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_url: String,
    pub collection_id: String,
    pub auth_scheme: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub placeholder_title: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            collection_id: DEFAULT_COLLECTION_ID.to_string(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            placeholder_title: DEFAULT_PLACEHOLDER_TITLE.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }

    pub fn collection_id(mut self, id: impl Into<String>) -> Self {
        self.collection_id = id.into();
        self
    }

    pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_response_bytes(mut self, bytes: usize) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    pub fn placeholder_title(mut self, title: impl Into<String>) -> Self {
        self.placeholder_title = title.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.collection_id, "album-list");
        assert_eq!(config.auth_scheme, "OAuth");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert!(!MountConfig::default().allow_destructive);
    }

    #[test]
    fn test_builder_chain() {
        let config = ServiceConfig::new()
            .service_url("http://localhost:8080/api/me/")
            .max_retries(0)
            .retry_delay(Duration::from_millis(10))
            .placeholder_title("Без названия");
        assert_eq!(config.service_url, "http://localhost:8080/api/me/");
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.placeholder_title, "Без названия");
    }
}
