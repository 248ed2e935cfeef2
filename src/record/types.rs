use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::cidr::{V4_MAX_PREFIX, V6_MAX_PREFIX};
use crate::result::SpfResult;

/// Directive prefix selecting the result on a match (RFC 7208 §4.6.2).
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl Qualifier {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Pass),
            '-' => Some(Self::Fail),
            '~' => Some(Self::SoftFail),
            '?' => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Pass => '+',
            Self::Fail => '-',
            Self::SoftFail => '~',
            Self::Neutral => '?',
        }
    }

    pub fn result(self) -> SpfResult {
        match self {
            Self::Pass => SpfResult::Pass,
            Self::Fail => SpfResult::Fail,
            Self::SoftFail => SpfResult::SoftFail,
            Self::Neutral => SpfResult::Neutral,
        }
    }
}

/// Optional `/v4` and `//v6` prefix lengths of `a` and `mx`.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DualCidr {
    pub v4: Option<u8>,
    pub v6: Option<u8>,
}

impl DualCidr {
    pub fn v4_len(&self) -> u8 {
        self.v4.unwrap_or(V4_MAX_PREFIX)
    }

    pub fn v6_len(&self) -> u8 {
        self.v6.unwrap_or(V6_MAX_PREFIX)
    }
}

impl fmt::Display for DualCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v4) = self.v4 {
            write!(f, "/{v4}")?;
        }
        if let Some(v6) = self.v6 {
            write!(f, "//{v6}")?;
        }
        Ok(())
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismKind {
    All,
    Include,
    A,
    Mx,
    Ptr,
    Ip4,
    Ip6,
    Exists,
}

impl MechanismKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Include => "include",
            Self::A => "a",
            Self::Mx => "mx",
            Self::Ptr => "ptr",
            Self::Ip4 => "ip4",
            Self::Ip6 => "ip6",
            Self::Exists => "exists",
        }
    }

    /// Mechanisms charged against the DNS lookup budget.
    pub fn queries_dns(self) -> bool {
        !matches!(self, Self::All | Self::Ip4 | Self::Ip6)
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mechanism {
    All,
    Include {
        domain_spec: String,
    },
    A {
        domain_spec: Option<String>,
        cidr: DualCidr,
    },
    Mx {
        domain_spec: Option<String>,
        cidr: DualCidr,
    },
    Ptr {
        domain_spec: Option<String>,
    },
    Ip4 {
        network: Ipv4Addr,
        prefix: Option<u8>,
    },
    Ip6 {
        network: Ipv6Addr,
        prefix: Option<u8>,
    },
    Exists {
        domain_spec: String,
    },
}

impl Mechanism {
    pub fn kind(&self) -> MechanismKind {
        match self {
            Self::All => MechanismKind::All,
            Self::Include { .. } => MechanismKind::Include,
            Self::A { .. } => MechanismKind::A,
            Self::Mx { .. } => MechanismKind::Mx,
            Self::Ptr { .. } => MechanismKind::Ptr,
            Self::Ip4 { .. } => MechanismKind::Ip4,
            Self::Ip6 { .. } => MechanismKind::Ip6,
            Self::Exists { .. } => MechanismKind::Exists,
        }
    }

    /// The domain-spec argument, when the mechanism carries one.
    pub fn domain_spec(&self) -> Option<&str> {
        match self {
            Self::Include { domain_spec } | Self::Exists { domain_spec } => {
                Some(domain_spec.as_str())
            }
            Self::A { domain_spec, .. }
            | Self::Mx { domain_spec, .. }
            | Self::Ptr { domain_spec } => domain_spec.as_deref(),
            Self::All | Self::Ip4 { .. } | Self::Ip6 { .. } => None,
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().name())?;
        match self {
            Self::All => Ok(()),
            Self::Include { domain_spec } | Self::Exists { domain_spec } => {
                write!(f, ":{domain_spec}")
            }
            Self::A { domain_spec, cidr } | Self::Mx { domain_spec, cidr } => {
                if let Some(domain_spec) = domain_spec {
                    write!(f, ":{domain_spec}")?;
                }
                write!(f, "{cidr}")
            }
            Self::Ptr { domain_spec } => match domain_spec {
                Some(domain_spec) => write!(f, ":{domain_spec}"),
                None => Ok(()),
            },
            Self::Ip4 { network, prefix } => {
                write!(f, ":{network}")?;
                prefix.map_or(Ok(()), |prefix| write!(f, "/{prefix}"))
            }
            Self::Ip6 { network, prefix } => {
                write!(f, ":{network}")?;
                prefix.map_or(Ok(()), |prefix| write!(f, "/{prefix}"))
            }
        }
    }
}

/// A qualified mechanism.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive {
    pub qualifier: Qualifier,
    pub mechanism: Mechanism,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifier != Qualifier::Pass {
            write!(f, "{}", self.qualifier.as_char())?;
        }
        write!(f, "{}", self.mechanism)
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Modifier {
    Redirect(String),
    Exp(String),
    Unknown { name: String, value: String },
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect(domain_spec) => write!(f, "redirect={domain_spec}"),
            Self::Exp(domain_spec) => write!(f, "exp={domain_spec}"),
            Self::Unknown { name, value } => write!(f, "{name}={value}"),
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Directive(Directive),
    Modifier(Modifier),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directive(directive) => write!(f, "{directive}"),
            Self::Modifier(modifier) => write!(f, "{modifier}"),
        }
    }
}

/// A parsed `v=spf1` record: its terms in source order.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRecord {
    terms: Vec<Term>,
}

impl PolicyRecord {
    pub(crate) fn new(terms: Vec<Term>) -> Self {
        Self { terms }
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.terms.iter().filter_map(|term| match term {
            Term::Directive(directive) => Some(directive),
            Term::Modifier(_) => None,
        })
    }

    pub fn redirect(&self) -> Option<&str> {
        self.terms.iter().find_map(|term| match term {
            Term::Modifier(Modifier::Redirect(target)) => Some(target.as_str()),
            _ => None,
        })
    }

    pub fn explanation(&self) -> Option<&str> {
        self.terms.iter().find_map(|term| match term {
            Term::Modifier(Modifier::Exp(target)) => Some(target.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for PolicyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("v=spf1")?;
        for term in &self.terms {
            write!(f, " {term}")?;
        }
        Ok(())
    }
}
