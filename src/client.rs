//! Query facade: validates raw inputs, runs one evaluation with a fresh
//! lookup budget and folds every failure into an [`SpfResult`].

use std::fmt::Write as _;
use std::net::IpAddr;

use tracing::debug;

use crate::cidr::canonical_client;
use crate::domain::{normalize_domain, split_sender};
use crate::error::SpfError;
use crate::eval::{Evaluator, LookupBudget, Request};
use crate::options::SpfOptions;
use crate::resolver::SpfResolver;
use crate::result::SpfResult;

/// Reusable SPF checker. Holds no per-query state, so one client can serve
/// concurrent queries when its resolver is `Sync`.
#[derive(Debug, Clone)]
pub struct SpfClient<R> {
    resolver: R,
    options: SpfOptions,
}

#[cfg(feature = "with-dns")]
impl SpfClient<trust_dns_resolver::Resolver> {
    /// Client backed by the system DNS configuration.
    pub fn from_system_conf(options: SpfOptions) -> Result<Self, SpfError> {
        let resolver = crate::resolver::system_resolver(&options)?;
        Ok(Self::with_options(resolver, options))
    }
}

impl<R: SpfResolver> SpfClient<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_options(resolver, SpfOptions::default())
    }

    pub fn with_options(resolver: R, options: SpfOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> &SpfOptions {
        &self.options
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Checks `sender` (an address or a bare domain) against a textual client
    /// address. Unparseable input yields [`SpfResult::Invalid`].
    pub fn query(&self, sender: &str, client_ip: &str) -> QueryOutcome {
        let trimmed = client_ip.trim();
        match trimmed.parse::<IpAddr>() {
            Ok(ip) => self.run(sender, ip, None),
            Err(err) => QueryOutcome::rejected(sender, None, SpfError::invalid_ip(trimmed, err)),
        }
    }

    pub fn query_addr(&self, sender: &str, client_ip: IpAddr) -> QueryOutcome {
        self.run(sender, client_ip, None)
    }

    /// Same as [`SpfClient::query_addr`] with an explicit HELO identity for
    /// `%{h}`.
    pub fn query_with_helo(&self, sender: &str, client_ip: IpAddr, helo: &str) -> QueryOutcome {
        self.run(sender, client_ip, Some(helo))
    }

    fn run(&self, sender: &str, client_ip: IpAddr, helo: Option<&str>) -> QueryOutcome {
        let client_ip = canonical_client(client_ip);
        let (local_part, raw_domain) = split_sender(sender);
        let domain = match normalize_domain(raw_domain) {
            Ok(domain) => domain,
            Err(err) => return QueryOutcome::rejected(sender, Some(client_ip), err),
        };
        let sender = format!("{local_part}@{domain}");
        let helo = helo
            .map(str::trim)
            .filter(|helo| !helo.is_empty())
            .map(|helo| helo.trim_end_matches('.').to_ascii_lowercase())
            .or_else(|| self.options.helo_domain.clone())
            .unwrap_or_else(|| domain.clone());

        let request = Request::new(sender.clone(), domain.clone(), client_ip, helo.clone());
        let mut budget = LookupBudget::from_options(&self.options);
        let evaluation = Evaluator::new(&self.resolver, &self.options).evaluate(&request, &mut budget);

        let (result, explanation, error) = match evaluation {
            Ok(evaluation) => (evaluation.result, evaluation.explanation, None),
            Err(err) => (err.result(), None, Some(err)),
        };
        debug!(
            %domain,
            %client_ip,
            %result,
            dns_lookups = budget.dns_lookups(),
            void_lookups = budget.void_lookups(),
            "SPF check finished"
        );

        QueryOutcome {
            sender,
            domain,
            client_ip: Some(client_ip),
            helo: Some(helo),
            result,
            explanation,
            error,
            dns_lookups: budget.dns_lookups(),
            void_lookups: budget.void_lookups(),
        }
    }
}

/// Result of one query plus the detail behind it.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Envelope sender as evaluated (`postmaster@` filled in when needed).
    pub sender: String,
    pub domain: String,
    pub client_ip: Option<IpAddr>,
    pub helo: Option<String>,
    pub result: SpfResult,
    /// Only set on `fail` when the policy publishes `exp=`.
    pub explanation: Option<String>,
    /// Why an error result was produced.
    pub error: Option<SpfError>,
    pub dns_lookups: usize,
    pub void_lookups: usize,
}

impl QueryOutcome {
    fn rejected(sender: &str, client_ip: Option<IpAddr>, error: SpfError) -> Self {
        let (_, domain) = split_sender(sender);
        Self {
            sender: sender.trim().to_string(),
            domain: domain.to_string(),
            client_ip,
            helo: None,
            result: error.result(),
            explanation: None,
            error: Some(error),
            dns_lookups: 0,
            void_lookups: 0,
        }
    }

    pub fn into_parts(self) -> (SpfResult, Option<String>, Option<SpfError>) {
        (self.result, self.explanation, self.error)
    }

    /// Value for a `Received-SPF:` trace header (RFC 7208 §9.1).
    pub fn header_value(&self) -> String {
        let mut value = self.result.as_str().to_string();
        if let Some(ip) = self.client_ip {
            let _ = write!(value, " client-ip={ip};");
        }
        let _ = write!(value, " envelope-from=\"{}\";", self.sender.replace('"', ""));
        if let Some(helo) = &self.helo {
            let _ = write!(value, " helo={helo};");
        }
        if let Some(error) = &self.error {
            let _ = write!(value, " problem=\"{}\";", error.to_string().replace('"', "'"));
        }
        value
    }
}
