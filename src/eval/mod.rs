//! `check_host()` evaluation (RFC 7208 §4).

mod budget;

pub use budget::LookupBudget;

use std::net::IpAddr;

use tracing::{debug, trace};

use crate::cidr;
use crate::domain::{is_same_or_subdomain, is_valid_fqdn, truncate_domain};
use crate::error::SpfError;
use crate::macros::{self, MacroContext, MacroScope};
use crate::options::SpfOptions;
use crate::record::{self, DualCidr, Mechanism, PolicyRecord};
use crate::resolver::{DnsError, SpfResolver};
use crate::result::SpfResult;

/// One level of evaluation: the domain whose policy is being checked plus
/// the identity of the connecting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Full envelope sender, `local@domain`.
    pub sender: String,
    pub domain: String,
    pub client_ip: IpAddr,
    pub helo: String,
    pub depth: usize,
}

impl Request {
    pub fn new(
        sender: impl Into<String>,
        domain: impl Into<String>,
        client_ip: IpAddr,
        helo: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            domain: domain.into(),
            client_ip,
            helo: helo.into(),
            depth: 0,
        }
    }

    fn descend(&self, domain: String) -> Self {
        Self {
            domain,
            depth: self.depth + 1,
            ..self.clone()
        }
    }
}

/// Outcome of a successful evaluation. Error results travel as
/// [`SpfError`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: SpfResult,
    pub explanation: Option<String>,
}

impl Evaluation {
    fn new(result: SpfResult) -> Self {
        Self {
            result,
            explanation: None,
        }
    }
}

pub struct Evaluator<'r, R: ?Sized> {
    resolver: &'r R,
    options: &'r SpfOptions,
}

impl<'r, R: SpfResolver + ?Sized> Evaluator<'r, R> {
    pub fn new(resolver: &'r R, options: &'r SpfOptions) -> Self {
        Self { resolver, options }
    }

    /// Evaluates the policy published at `request.domain`. The budget is
    /// shared with every nested `include` and `redirect`.
    pub fn evaluate(
        &self,
        request: &Request,
        budget: &mut LookupBudget,
    ) -> Result<Evaluation, SpfError> {
        if request.depth > self.options.max_depth {
            return Err(SpfError::RecursionLimit {
                limit: self.options.max_depth,
            });
        }
        if !is_valid_fqdn(&request.domain) {
            debug!(domain = %request.domain, "not a valid FQDN, no policy");
            return Ok(Evaluation::new(SpfResult::None));
        }

        let Some(record) = self.fetch_record(&request.domain)? else {
            debug!(domain = %request.domain, "no SPF record published");
            return Ok(Evaluation::new(SpfResult::None));
        };
        debug!(domain = %request.domain, depth = request.depth, %record, "evaluating SPF record");

        for directive in record.directives() {
            if self.matches(&directive.mechanism, request, budget)? {
                let result = directive.qualifier.result();
                trace!(%directive, %result, "directive matched");
                let explanation = match result {
                    SpfResult::Fail => self.explain(&record, request),
                    _ => None,
                };
                return Ok(Evaluation {
                    result,
                    explanation,
                });
            }
        }

        if let Some(target) = record.redirect() {
            budget.charge_lookup()?;
            let domain = self.expand_domain(target, request)?;
            debug!(from = %request.domain, to = %domain, "following redirect");
            let inner = self.evaluate(&request.descend(domain.clone()), budget)?;
            if inner.result == SpfResult::None {
                return Err(SpfError::RedirectWithoutPolicy { domain });
            }
            return Ok(inner);
        }

        Ok(Evaluation::new(SpfResult::Neutral))
    }

    fn fetch_record(&self, domain: &str) -> Result<Option<PolicyRecord>, SpfError> {
        let answers = match self.resolver.lookup_txt(domain) {
            Ok(answers) => answers,
            Err(DnsError::NxDomain) => return Ok(None),
            Err(err) => return Err(SpfError::dns(domain, err)),
        };
        record::parse_answers(&answers).map_err(|err| SpfError::record(domain, err))
    }

    fn matches(
        &self,
        mechanism: &Mechanism,
        request: &Request,
        budget: &mut LookupBudget,
    ) -> Result<bool, SpfError> {
        match mechanism {
            Mechanism::All => Ok(true),
            Mechanism::Include { domain_spec } => {
                budget.charge_lookup()?;
                let domain = self.expand_domain(domain_spec, request)?;
                let inner = self.evaluate(&request.descend(domain.clone()), budget)?;
                trace!(%domain, result = %inner.result, "include evaluated");
                match inner.result {
                    SpfResult::Pass => Ok(true),
                    SpfResult::None => Err(SpfError::IncludeWithoutPolicy { domain }),
                    _ => Ok(false),
                }
            }
            Mechanism::A { domain_spec, cidr } => {
                budget.charge_lookup()?;
                let target = self.target_domain(domain_spec.as_deref(), request)?;
                let addrs = self.lookup_addresses(&target, request.client_ip, budget)?;
                Ok(any_in_network(&addrs, cidr, request.client_ip))
            }
            Mechanism::Mx { domain_spec, cidr } => {
                budget.charge_lookup()?;
                let target = self.target_domain(domain_spec.as_deref(), request)?;
                self.match_mx(&target, cidr, request.client_ip, budget)
            }
            Mechanism::Ptr { domain_spec } => {
                budget.charge_lookup()?;
                let target = self.target_domain(domain_spec.as_deref(), request)?;
                let names = self.validated_names(request.client_ip, Some(budget))?;
                Ok(names.iter().any(|name| is_same_or_subdomain(name, &target)))
            }
            Mechanism::Ip4 { network, prefix } => Ok(match request.client_ip {
                IpAddr::V4(ip) => {
                    cidr::v4_contains(*network, prefix.unwrap_or(cidr::V4_MAX_PREFIX), ip)
                }
                IpAddr::V6(_) => false,
            }),
            Mechanism::Ip6 { network, prefix } => Ok(match request.client_ip {
                IpAddr::V6(ip) => {
                    cidr::v6_contains(*network, prefix.unwrap_or(cidr::V6_MAX_PREFIX), ip)
                }
                IpAddr::V4(_) => false,
            }),
            Mechanism::Exists { domain_spec } => {
                budget.charge_lookup()?;
                let target = self.expand_domain(domain_spec, request)?;
                match self.resolver.lookup_a(&target) {
                    Ok(addrs) if !addrs.is_empty() => Ok(true),
                    Ok(_) | Err(DnsError::NxDomain) => {
                        budget.record_void()?;
                        Ok(false)
                    }
                    Err(err) => Err(SpfError::dns(target, err)),
                }
            }
        }
    }

    fn match_mx(
        &self,
        domain: &str,
        cidr: &DualCidr,
        client_ip: IpAddr,
        budget: &mut LookupBudget,
    ) -> Result<bool, SpfError> {
        let mut exchanges = match self.resolver.lookup_mx(domain) {
            Ok(exchanges) => exchanges,
            Err(DnsError::NxDomain) => Vec::new(),
            Err(err) => return Err(SpfError::dns(domain, err)),
        };
        if exchanges.is_empty() {
            budget.record_void()?;
            return Ok(false);
        }
        if exchanges.len() > self.options.max_mx_names {
            return Err(SpfError::TooManyMxRecords {
                domain: domain.to_string(),
                count: exchanges.len(),
                limit: self.options.max_mx_names,
            });
        }
        exchanges.sort();

        for mx in &exchanges {
            budget.charge_lookup()?;
            let addrs = self.lookup_addresses(&mx.exchange, client_ip, budget)?;
            if any_in_network(&addrs, cidr, client_ip) {
                trace!(exchange = %mx.exchange, "mx matched");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A or AAAA lookup matching the client's family. Empty answers count
    /// as void.
    fn lookup_addresses(
        &self,
        name: &str,
        client_ip: IpAddr,
        budget: &mut LookupBudget,
    ) -> Result<Vec<IpAddr>, SpfError> {
        match self.address_answer(name, client_ip) {
            Ok(addrs) if !addrs.is_empty() => Ok(addrs),
            Ok(_) | Err(DnsError::NxDomain) => {
                budget.record_void()?;
                Ok(Vec::new())
            }
            Err(err) => Err(SpfError::dns(name, err)),
        }
    }

    fn address_answer(&self, name: &str, client_ip: IpAddr) -> Result<Vec<IpAddr>, DnsError> {
        match client_ip {
            IpAddr::V4(_) => self
                .resolver
                .lookup_a(name)
                .map(|addrs| addrs.into_iter().map(IpAddr::V4).collect()),
            IpAddr::V6(_) => self
                .resolver
                .lookup_aaaa(name)
                .map(|addrs| addrs.into_iter().map(IpAddr::V6).collect()),
        }
    }

    /// Reverse names of `client_ip` that resolve forward to it. PTR failures
    /// yield no names; an empty or NXDOMAIN PTR answer is void when a budget
    /// is given.
    fn validated_names(
        &self,
        client_ip: IpAddr,
        budget: Option<&mut LookupBudget>,
    ) -> Result<Vec<String>, SpfError> {
        let names = match self.resolver.lookup_ptr(client_ip) {
            Ok(names) => names,
            Err(DnsError::NxDomain) => Vec::new(),
            Err(err) => {
                trace!(%client_ip, %err, "PTR lookup failed");
                return Ok(Vec::new());
            }
        };
        if names.is_empty() {
            if let Some(budget) = budget {
                budget.record_void()?;
            }
            return Ok(Vec::new());
        }

        let validated = names
            .into_iter()
            .take(self.options.max_ptr_names)
            .filter(|name| match self.address_answer(name, client_ip) {
                Ok(addrs) => addrs.contains(&client_ip),
                Err(_) => false,
            })
            .collect();
        Ok(validated)
    }

    /// Value of `%{p}`: a validated name equal to the current domain, then
    /// one below it, then any.
    fn validated_name(&self, request: &Request) -> Option<String> {
        let names = self.validated_names(request.client_ip, None).ok()?;
        names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(&request.domain))
            .or_else(|| {
                names
                    .iter()
                    .find(|name| is_same_or_subdomain(name, &request.domain))
            })
            .or_else(|| names.first())
            .cloned()
    }

    fn target_domain(
        &self,
        domain_spec: Option<&str>,
        request: &Request,
    ) -> Result<String, SpfError> {
        match domain_spec {
            Some(spec) => self.expand_domain(spec, request),
            None => Ok(request.domain.clone()),
        }
    }

    fn expand_domain(&self, domain_spec: &str, request: &Request) -> Result<String, SpfError> {
        let expanded = self.expand(domain_spec, request, MacroScope::DomainSpec)?;
        let expanded = expanded.trim_end_matches('.');
        Ok(truncate_domain(expanded).to_ascii_lowercase())
    }

    fn expand(
        &self,
        template: &str,
        request: &Request,
        scope: MacroScope,
    ) -> Result<String, SpfError> {
        let validated = if macros::needs_validated_name(template) {
            self.validated_name(request)
        } else {
            None
        };
        let ctx = MacroContext::new(
            &request.sender,
            &request.domain,
            request.client_ip,
            &request.helo,
        )
        .with_validated_name(validated.as_deref())
        .with_receiving_domain(self.options.receiving_domain());
        Ok(macros::expand(template, &ctx, scope)?)
    }

    /// Explanation for a `fail` result. Any failure along the way just omits
    /// it. Not charged against the budget.
    fn explain(&self, record: &PolicyRecord, request: &Request) -> Option<String> {
        let domain_spec = record.explanation()?;
        let target = match self.expand_domain(domain_spec, request) {
            Ok(target) if is_valid_fqdn(&target) => target,
            Ok(target) => {
                debug!(%target, "exp target is not a valid FQDN");
                return None;
            }
            Err(err) => {
                debug!(%err, "exp domain-spec did not expand");
                return None;
            }
        };
        let answers = match self.resolver.lookup_txt(&target) {
            Ok(answers) => answers,
            Err(err) => {
                debug!(%target, %err, "explanation lookup failed");
                return None;
            }
        };
        let text = answers.into_iter().next()?;
        self.expand(&text, request, MacroScope::Explanation).ok()
    }
}

fn any_in_network(addrs: &[IpAddr], cidr: &DualCidr, client_ip: IpAddr) -> bool {
    addrs
        .iter()
        .any(|addr| cidr::contains(*addr, cidr.v4_len(), cidr.v6_len(), client_ip))
}
