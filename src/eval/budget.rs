use tracing::warn;

use crate::error::SpfError;
use crate::options::SpfOptions;

/// DNS lookup counters shared by every level of one top-level check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupBudget {
    dns_used: usize,
    void_used: usize,
    max_dns: usize,
    max_void: usize,
}

impl LookupBudget {
    pub fn new(max_dns: usize, max_void: usize) -> Self {
        Self {
            dns_used: 0,
            void_used: 0,
            max_dns,
            max_void,
        }
    }

    pub fn from_options(options: &SpfOptions) -> Self {
        Self::new(options.max_dns_lookups, options.max_void_lookups)
    }

    /// Charges one DNS-querying term. Fails once the limit is already spent,
    /// before any query is sent.
    pub fn charge_lookup(&mut self) -> Result<(), SpfError> {
        if self.dns_used >= self.max_dns {
            warn!(limit = self.max_dns, "DNS lookup limit exceeded");
            return Err(SpfError::DnsLookupLimit {
                limit: self.max_dns,
            });
        }
        self.dns_used += 1;
        Ok(())
    }

    /// Records an empty or NXDOMAIN answer.
    pub fn record_void(&mut self) -> Result<(), SpfError> {
        self.void_used += 1;
        if self.void_used > self.max_void {
            warn!(limit = self.max_void, "void lookup limit exceeded");
            return Err(SpfError::VoidLookupLimit {
                limit: self.max_void,
            });
        }
        Ok(())
    }

    pub fn dns_lookups(&self) -> usize {
        self.dns_used
    }

    pub fn void_lookups(&self) -> usize {
        self.void_used
    }
}
