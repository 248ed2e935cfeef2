use thiserror::Error;

use crate::resolver::DnsError;
use crate::result::SpfResult;

/// Errors raised while evaluating an SPF policy.
///
/// Every variant maps onto exactly one [`SpfResult`] through
/// [`SpfError::result`]; the engine never lets one escape a query as anything
/// other than diagnostic detail.
#[derive(Debug, Error)]
pub enum SpfError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("domain IDNA conversion failed for {input}")]
    IdnaConversion {
        input: String,
        #[source]
        source: idna::Errors,
    },
    #[error("domain {domain} is not a valid FQDN: {reason}")]
    InvalidDomain { domain: String, reason: String },
    #[error("client address '{input}' is not a valid IPv4 or IPv6 address")]
    InvalidIp {
        input: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("invalid SPF record for {domain}: {source}")]
    Record {
        domain: String,
        #[source]
        source: RecordError,
    },
    #[error("macro expansion failed: {source}")]
    Macro {
        #[source]
        source: MacroError,
    },
    #[error("DNS lookup limit exceeded ({limit})")]
    DnsLookupLimit { limit: usize },
    #[error("void lookup limit exceeded ({limit})")]
    VoidLookupLimit { limit: usize },
    #[error("include/redirect recursion deeper than {limit}")]
    RecursionLimit { limit: usize },
    #[error("{domain} has {count} MX records, more than {limit} allowed")]
    TooManyMxRecords {
        domain: String,
        count: usize,
        limit: usize,
    },
    #[error("included domain {domain} has no SPF record")]
    IncludeWithoutPolicy { domain: String },
    #[error("redirect target {domain} has no SPF record")]
    RedirectWithoutPolicy { domain: String },
    #[error("DNS lookup failed for {name}: {source}")]
    Dns {
        name: String,
        #[source]
        source: DnsError,
    },
    #[error("resolver initialization failed: {source}")]
    ResolverInit {
        #[source]
        source: std::io::Error,
    },
}

impl SpfError {
    pub(crate) fn idna(input: impl Into<String>, source: idna::Errors) -> Self {
        Self::IdnaConversion {
            input: input.into(),
            source,
        }
    }

    pub(crate) fn invalid_domain(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_ip(input: impl Into<String>, source: std::net::AddrParseError) -> Self {
        Self::InvalidIp {
            input: input.into(),
            source,
        }
    }

    pub(crate) fn record(domain: impl Into<String>, source: RecordError) -> Self {
        Self::Record {
            domain: domain.into(),
            source,
        }
    }

    #[cfg_attr(not(feature = "with-dns"), allow(dead_code))]
    pub(crate) fn resolver_init(source: std::io::Error) -> Self {
        Self::ResolverInit { source }
    }

    pub(crate) fn dns(name: impl Into<String>, source: DnsError) -> Self {
        Self::Dns {
            name: name.into(),
            source,
        }
    }

    /// The SPF result this error resolves to.
    pub fn result(&self) -> SpfResult {
        match self {
            Self::EmptyDomain
            | Self::IdnaConversion { .. }
            | Self::InvalidDomain { .. }
            | Self::InvalidIp { .. } => SpfResult::Invalid,
            Self::Dns { .. } | Self::ResolverInit { .. } => SpfResult::TempError,
            Self::Record { .. }
            | Self::Macro { .. }
            | Self::DnsLookupLimit { .. }
            | Self::VoidLookupLimit { .. }
            | Self::RecursionLimit { .. }
            | Self::TooManyMxRecords { .. }
            | Self::IncludeWithoutPolicy { .. }
            | Self::RedirectWithoutPolicy { .. } => SpfResult::PermError,
        }
    }
}

impl From<MacroError> for SpfError {
    fn from(source: MacroError) -> Self {
        Self::Macro { source }
    }
}

/// Syntax errors found while parsing an SPF record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{count} TXT records start with v=spf1")]
    MultipleRecords { count: usize },
    #[error("record does not start with v=spf1")]
    InvalidVersion,
    #[error("unknown mechanism '{0}'")]
    UnknownMechanism(String),
    #[error("mechanism '{mechanism}' takes no argument")]
    UnexpectedArgument { mechanism: String },
    #[error("mechanism '{mechanism}' requires a domain-spec")]
    MissingDomainSpec { mechanism: String },
    #[error("invalid domain-spec '{value}': {reason}")]
    InvalidDomainSpec { value: String, reason: String },
    #[error("invalid IPv4 network '{0}'")]
    InvalidIp4(String),
    #[error("invalid IPv6 network '{0}'")]
    InvalidIp6(String),
    #[error("invalid CIDR length '{0}'")]
    InvalidCidr(String),
    #[error("modifier '{0}' appears more than once")]
    DuplicateModifier(String),
    #[error("invalid modifier name '{0}'")]
    InvalidModifierName(String),
    #[error("modifier '{0}' cannot carry a qualifier")]
    QualifiedModifier(String),
    #[error(transparent)]
    Macro(#[from] MacroError),
}

/// Malformed macro-string syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("unterminated macro expression")]
    Unterminated,
    #[error("lone '%' at end of macro-string")]
    TrailingPercent,
    #[error("invalid escape '%{0}'")]
    InvalidEscape(char),
    #[error("unknown macro letter '{0}'")]
    UnknownLetter(char),
    #[error("macro letter '{0}' is only allowed in explanations")]
    ExplanationOnly(char),
    #[error("invalid macro transformer '{0}'")]
    InvalidTransformer(String),
    #[error("empty macro expression")]
    Empty,
}
