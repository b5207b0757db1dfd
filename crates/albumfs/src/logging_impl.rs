//! Logging helpers for albumfs
//!
//! Values that reach `tracing` events pass through here first.
//!
//! # Log Levels
//!
//! - **ERROR**: Remote failures surfaced to the kernel as EIO
//! - **WARN**: Retried requests, token refreshes, failed uploads kept for retry
//! - **INFO**: Mount lifecycle, albums and photos created or deleted
//! - **DEBUG**: Every filesystem operation and remote request
//! - **TRACE**: Cache hits and misses
//!
//! # Redaction
//!
//! - Credentials in URL userinfo
//! - Token-carrying query parameters
//! - Control characters in remote titles (log injection)

use std::borrow::Cow;
use std::collections::HashSet;
use url::Url;

const REDACTED: &str = "[REDACTED]";

/// Configuration for logging behavior.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to redact sensitive data from logs (default: true)
    pub redact_sensitive: bool,

    /// Query parameter names whose values are redacted (case-insensitive)
    pub redact_query_params: HashSet<String>,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        let redact_query_params = ["oauth_token", "access_token", "token", "auth", "key"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        Self {
            redact_sensitive: true,
            redact_query_params,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Redact userinfo and token-carrying query parameters from a URL.
    pub fn redact_url<'a>(&self, url: &'a str) -> Cow<'a, str> {
        if !self.redact_sensitive {
            return self.truncate(url);
        }
        let Ok(mut parsed) = Url::parse(url) else {
            return self.truncate(url);
        };

        let mut changed = false;
        if parsed.password().is_some() {
            let _ = parsed.set_password(None);
            let _ = parsed.set_username(REDACTED);
            changed = true;
        }

        let sensitive = |name: &str| self.redact_query_params.contains(&name.to_lowercase());
        if parsed.query_pairs().any(|(k, _)| sensitive(&k)) {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if sensitive(&k) {
                        REDACTED.to_string()
                    } else {
                        v.into_owned()
                    };
                    (k.into_owned(), v)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            changed = true;
        }

        if changed {
            Cow::Owned(self.truncate(parsed.as_str()).into_owned())
        } else {
            self.truncate(url)
        }
    }

    /// Sanitize and truncate a remote-supplied string such as a title or path.
    pub fn display_name(&self, name: &str) -> String {
        self.truncate(&sanitize_for_log(name)).into_owned()
    }

    /// Truncate value if it exceeds max length, on a char boundary.
    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Escape characters that could forge log lines.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
