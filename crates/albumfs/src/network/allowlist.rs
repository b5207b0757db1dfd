//! Origin allowlist for credentials.
//!
//! Link hrefs come from remote documents, so any of them could point at a
//! third-party host. The access token is only attached to requests whose
//! origin (scheme, host, port) is on this list. Other URLs are still
//! fetched, just anonymously.

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    fn of(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port_or_known_default(),
        })
    }
}

/// Set of origins that may receive the access token.
/// An empty allowlist sends no credentials anywhere.
#[derive(Debug, Clone, Default)]
pub struct OriginAllowlist {
    origins: Vec<Origin>,
}

/// Result of matching a URL against the allowlist
#[derive(Debug, Clone, PartialEq)]
pub enum UrlMatch {
    /// Same origin as an allowlisted URL
    Allowed,
    /// Foreign origin
    Blocked { reason: String },
    /// URL could not be parsed
    Invalid { reason: String },
}

impl OriginAllowlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allowlist holding only the origin of `service_url`.
    pub fn for_service(service_url: &str) -> Self {
        Self::new().allow(service_url)
    }

    /// Add the origin of `url`. Path, query and fragment are ignored;
    /// unparseable URLs are skipped.
    pub fn allow(mut self, url: &str) -> Self {
        match Url::parse(url).ok().as_ref().and_then(Origin::of) {
            Some(origin) if !self.origins.contains(&origin) => self.origins.push(origin),
            Some(_) => {}
            None => tracing::warn!("ignoring unparseable allowlist entry"),
        }
        self
    }

    pub fn check(&self, url: &str) -> UrlMatch {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return UrlMatch::Invalid {
                    reason: format!("invalid URL: {}", e),
                };
            }
        };
        let Some(origin) = Origin::of(&parsed) else {
            return UrlMatch::Invalid {
                reason: "URL has no host".to_string(),
            };
        };
        if self.origins.contains(&origin) {
            UrlMatch::Allowed
        } else {
            UrlMatch::Blocked {
                reason: format!("foreign origin: {}://{}", origin.scheme, origin.host),
            }
        }
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        self.check(url) == UrlMatch::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist_blocks_all() {
        let allowlist = OriginAllowlist::new();
        assert!(matches!(
            allowlist.check("https://example.com"),
            UrlMatch::Blocked { .. }
        ));
    }

    #[test]
    fn test_service_origin_matches_any_path() {
        let allowlist = OriginAllowlist::for_service("https://api-fotki.yandex.ru/api/me/");
        assert!(allowlist.is_allowed("https://api-fotki.yandex.ru/api/me/albums/"));
        assert!(allowlist.is_allowed("https://API-FOTKI.yandex.ru/api/users/x/photo/1/"));
        assert!(allowlist.is_allowed("https://api-fotki.yandex.ru:443/api/me/"));
    }

    #[test]
    fn test_foreign_origins_blocked() {
        let allowlist = OriginAllowlist::for_service("https://api-fotki.yandex.ru/api/me/");
        // Different scheme
        assert!(!allowlist.is_allowed("http://api-fotki.yandex.ru/api/me/"));
        // Different host
        assert!(!allowlist.is_allowed("https://img-fotki.yandex.ru/get/1/orig"));
        // Different port
        assert!(!allowlist.is_allowed("https://api-fotki.yandex.ru:8443/api/me/"));
    }

    #[test]
    fn test_multiple_origins() {
        let allowlist = OriginAllowlist::new()
            .allow("http://localhost:3000/api/")
            .allow("https://cdn.example.com");
        assert!(allowlist.is_allowed("http://localhost:3000/other"));
        assert!(allowlist.is_allowed("https://cdn.example.com/a.jpg"));
        assert!(!allowlist.is_allowed("http://localhost/"));
    }

    #[test]
    fn test_invalid_url() {
        let allowlist = OriginAllowlist::for_service("https://example.com");
        assert!(matches!(
            allowlist.check("not a url"),
            UrlMatch::Invalid { .. }
        ));
    }
}
