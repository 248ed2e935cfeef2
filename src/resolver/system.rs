use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::trace;
use trust_dns_resolver::{
    Resolver,
    error::{ResolveError, ResolveErrorKind},
    lookup::TxtLookup,
    proto::op::ResponseCode,
    system_conf::read_system_conf,
};

use super::{DnsError, MxRecord, SpfResolver, normalize_name};
use crate::error::SpfError;
use crate::options::SpfOptions;

/// Builds a blocking resolver from the system configuration, applying the
/// lookup timeout and cache TTL cap from `options`.
pub fn system_resolver(options: &SpfOptions) -> Result<Resolver, SpfError> {
    let (config, mut opts) = read_system_conf()
        .map_err(|err| SpfError::resolver_init(std::io::Error::other(err.to_string())))?;
    opts.timeout = options.timeout();
    if let Some(ttl) = options.cache_ttl() {
        opts.positive_max_ttl = Some(ttl);
        opts.negative_max_ttl = Some(ttl);
    }
    Resolver::new(config, opts).map_err(SpfError::resolver_init)
}

impl SpfResolver for Resolver {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        trace!(name, "TXT lookup");
        match Resolver::txt_lookup(self, absolute(name).as_str()) {
            Ok(lookup) => Ok(collect_txt_records(&lookup)),
            Err(err) => empty_or_error(&err),
        }
    }

    fn lookup_a(&self, name: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        trace!(name, "A lookup");
        match Resolver::ipv4_lookup(self, absolute(name).as_str()) {
            Ok(lookup) => Ok(lookup.iter().map(|a| a.0).collect()),
            Err(err) => empty_or_error(&err),
        }
    }

    fn lookup_aaaa(&self, name: &str) -> Result<Vec<Ipv6Addr>, DnsError> {
        trace!(name, "AAAA lookup");
        match Resolver::ipv6_lookup(self, absolute(name).as_str()) {
            Ok(lookup) => Ok(lookup.iter().map(|aaaa| aaaa.0).collect()),
            Err(err) => empty_or_error(&err),
        }
    }

    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, DnsError> {
        trace!(name, "MX lookup");
        match Resolver::mx_lookup(self, absolute(name).as_str()) {
            Ok(lookup) => {
                let mut records: Vec<MxRecord> = lookup
                    .iter()
                    .map(|mx| MxRecord::new(mx.preference(), normalize_name(&mx.exchange().to_utf8())))
                    .collect();
                records.sort();
                records.dedup();
                Ok(records)
            }
            Err(err) => empty_or_error(&err),
        }
    }

    fn lookup_ptr(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        trace!(%ip, "PTR lookup");
        match Resolver::reverse_lookup(self, ip) {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|ptr| normalize_name(&ptr.0.to_utf8()))
                .collect()),
            Err(err) => empty_or_error(&err),
        }
    }
}

/// Names are sent fully qualified so resolv.conf search domains never apply.
fn absolute(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

fn collect_txt_records(lookup: &TxtLookup) -> Vec<String> {
    lookup
        .iter()
        .map(|txt| {
            txt.txt_data()
                .iter()
                .map(|piece| String::from_utf8_lossy(piece))
                .collect::<String>()
        })
        .collect()
}

fn empty_or_error<T>(err: &ResolveError) -> Result<Vec<T>, DnsError> {
    match classify(err) {
        Some(dns_error) => Err(dns_error),
        None => Ok(Vec::new()),
    }
}

/// `None` means the server answered NOERROR with no records.
fn classify(err: &ResolveError) -> Option<DnsError> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain => Some(DnsError::NxDomain),
            ResponseCode::ServFail => Some(DnsError::ServFail),
            ResponseCode::Refused => Some(DnsError::Refused),
            _ => None,
        },
        ResolveErrorKind::Timeout => Some(DnsError::Timeout),
        _ => Some(DnsError::Other(err.to_string())),
    }
}
