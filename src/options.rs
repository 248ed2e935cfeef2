use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// Limits and identities used by [`SpfClient`](crate::SpfClient).
///
/// The defaults follow RFC 7208 §4.6.4: ten DNS-querying terms and two void
/// answers per top-level check.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfOptions {
    pub max_dns_lookups: usize,
    pub max_void_lookups: usize,
    pub max_ptr_names: usize,
    pub max_mx_names: usize,
    pub max_depth: usize,
    pub timeout_ms: u64,
    pub cache_ttl_secs: Option<u64>,
    pub receiving_domain: Option<String>,
    pub helo_domain: Option<String>,
}

impl Default for SpfOptions {
    fn default() -> Self {
        Self {
            max_dns_lookups: 10,
            max_void_lookups: 2,
            max_ptr_names: 10,
            max_mx_names: 10,
            max_depth: 10,
            timeout_ms: 5_000,
            cache_ttl_secs: None,
            receiving_domain: None,
            helo_domain: None,
        }
    }
}

impl SpfOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dns_lookups(mut self, limit: usize) -> Self {
        self.max_dns_lookups = limit;
        self
    }

    pub fn with_max_void_lookups(mut self, limit: usize) -> Self {
        self.max_void_lookups = limit;
        self
    }

    pub fn with_max_ptr_names(mut self, limit: usize) -> Self {
        self.max_ptr_names = limit;
        self
    }

    pub fn with_max_depth(mut self, limit: usize) -> Self {
        self.max_depth = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_receiving_domain(mut self, domain: impl Into<String>) -> Self {
        self.receiving_domain = normalize_identity(domain.into());
        self
    }

    pub fn with_helo_domain(mut self, domain: impl Into<String>) -> Self {
        self.helo_domain = normalize_identity(domain.into());
        self
    }

    /// Per-lookup deadline handed to the DNS adapter.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Cache TTL override, when one is configured.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Value substituted for `%{r}` in explanations.
    pub fn receiving_domain(&self) -> &str {
        self.receiving_domain.as_deref().unwrap_or("unknown")
    }
}

fn normalize_identity(input: String) -> Option<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}
