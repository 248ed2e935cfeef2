//! DNS capability consumed by the evaluator.
//!
//! The engine only sees [`SpfResolver`]. An empty NOERROR answer is `Ok` with
//! no records; NXDOMAIN is [`DnsError::NxDomain`]. Both count as void lookups.

mod cache;
#[cfg(feature = "with-dns")]
mod system;

pub use cache::CachingResolver;
#[cfg(feature = "with-dns")]
pub use system::system_resolver;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use thiserror::Error;

/// DNS failures as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("lookup timed out")]
    Timeout,
    #[error("domain does not exist (NXDOMAIN)")]
    NxDomain,
    #[error("server failure (SERVFAIL)")]
    ServFail,
    #[error("query refused (REFUSED)")]
    Refused,
    #[error("{0}")]
    Other(String),
}

impl DnsError {
    /// NXDOMAIN is an answer; everything else means the lookup did not
    /// complete.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NxDomain)
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

pub trait SpfResolver {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;
    fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError>;
    fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError>;
    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, DnsError>;
    fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError>;
}

impl<R: SpfResolver + ?Sized> SpfResolver for &R {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        (**self).lookup_txt(name)
    }

    fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        (**self).lookup_a(name)
    }

    fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        (**self).lookup_aaaa(name)
    }

    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, DnsError> {
        (**self).lookup_mx(name)
    }

    fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        (**self).lookup_ptr(ip)
    }
}

impl<R: SpfResolver + ?Sized> SpfResolver for Arc<R> {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        (**self).lookup_txt(name)
    }

    fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        (**self).lookup_a(name)
    }

    fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        (**self).lookup_aaaa(name)
    }

    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, DnsError> {
        (**self).lookup_mx(name)
    }

    fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        (**self).lookup_ptr(ip)
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
