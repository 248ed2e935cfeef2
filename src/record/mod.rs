//! SPF record selection and parsing (RFC 7208 §4.5, §4.6, §12).

mod types;

pub use types::{
    Directive, DualCidr, Mechanism, MechanismKind, Modifier, PolicyRecord, Qualifier, Term,
};

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::LazyLock;

use phf::phf_map;
use regex::Regex;

use crate::cidr::{V4_MAX_PREFIX, V6_MAX_PREFIX};
use crate::error::RecordError;
use crate::macros::{self, MacroScope};

const VERSION: &str = "v=spf1";

const MECHANISMS: phf::Map<&'static str, MechanismKind> = phf_map! {
    "all" => MechanismKind::All,
    "include" => MechanismKind::Include,
    "a" => MechanismKind::A,
    "mx" => MechanismKind::Mx,
    "ptr" => MechanismKind::Ptr,
    "ip4" => MechanismKind::Ip4,
    "ip6" => MechanismKind::Ip6,
    "exists" => MechanismKind::Exists,
};

static MODIFIER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9._-]*$").expect("modifier name pattern compiles")
});

static TOPLABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9]*[A-Za-z][A-Za-z0-9]*|[A-Za-z0-9]+-[A-Za-z0-9-]*[A-Za-z0-9])$")
        .expect("toplabel pattern compiles")
});

// Trailing `/v4`, `//v6` or `/v4//v6` of `a` and `mx`.
static DUAL_CIDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<head>.*?)(?:/(?P<v4>[0-9]+))?(?://(?P<v6>[0-9]+))?$")
        .expect("dual-cidr pattern compiles")
});

/// `true` when a TXT answer is an SPF version 1 record.
pub fn is_spf_record(txt: &str) -> bool {
    let trimmed = txt.trim();
    if !starts_with_ignore_ascii_case(trimmed, VERSION) {
        return false;
    }
    trimmed[VERSION.len()..]
        .chars()
        .next()
        .is_none_or(|c| c.is_ascii_whitespace())
}

/// Picks the single SPF record out of a TXT answer set.
///
/// No candidate yields `Ok(None)`; more than one is a permanent error.
pub fn select_record(answers: &[String]) -> Result<Option<&str>, RecordError> {
    let mut candidates = answers
        .iter()
        .map(|answer| answer.trim())
        .filter(|answer| is_spf_record(answer));
    let Some(first) = candidates.next() else {
        return Ok(None);
    };
    let extra = candidates.count();
    if extra > 0 {
        return Err(RecordError::MultipleRecords { count: extra + 1 });
    }
    Ok(Some(first))
}

/// Selects and parses the SPF record of a TXT answer set.
pub fn parse_answers(answers: &[String]) -> Result<Option<PolicyRecord>, RecordError> {
    select_record(answers)?
        .map(PolicyRecord::parse)
        .transpose()
}

impl PolicyRecord {
    /// Parses one record. Any malformed term rejects the whole record.
    pub fn parse(record: &str) -> Result<Self, RecordError> {
        let mut tokens = record.split_ascii_whitespace();
        match tokens.next() {
            Some(version) if version.eq_ignore_ascii_case(VERSION) => {}
            _ => return Err(RecordError::InvalidVersion),
        }

        let mut terms = Vec::new();
        let mut seen_redirect = false;
        let mut seen_exp = false;
        for token in tokens {
            let term = parse_term(token)?;
            match &term {
                Term::Modifier(Modifier::Redirect(_)) => {
                    if std::mem::replace(&mut seen_redirect, true) {
                        return Err(RecordError::DuplicateModifier("redirect".to_string()));
                    }
                }
                Term::Modifier(Modifier::Exp(_)) => {
                    if std::mem::replace(&mut seen_exp, true) {
                        return Err(RecordError::DuplicateModifier("exp".to_string()));
                    }
                }
                _ => {}
            }
            terms.push(term);
        }
        Ok(Self::new(terms))
    }
}

impl FromStr for PolicyRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_term(token: &str) -> Result<Term, RecordError> {
    let mut chars = token.chars();
    let (qualifier, body) = match chars.next().and_then(Qualifier::from_char) {
        Some(qualifier) => (Some(qualifier), chars.as_str()),
        None => (None, token),
    };

    let name_end = body.find([':', '/', '=']).unwrap_or(body.len());
    let (name, rest) = body.split_at(name_end);

    if let Some(value) = rest.strip_prefix('=') {
        if qualifier.is_some() {
            return Err(RecordError::QualifiedModifier(name.to_string()));
        }
        return parse_modifier(name, value).map(Term::Modifier);
    }

    let kind = MECHANISMS
        .get(name.to_ascii_lowercase().as_str())
        .copied()
        .ok_or_else(|| RecordError::UnknownMechanism(token.to_string()))?;
    let mechanism = parse_mechanism(kind, rest)?;
    Ok(Term::Directive(Directive {
        qualifier: qualifier.unwrap_or(Qualifier::Pass),
        mechanism,
    }))
}

fn parse_modifier(name: &str, value: &str) -> Result<Modifier, RecordError> {
    if !MODIFIER_NAME.is_match(name) {
        return Err(RecordError::InvalidModifierName(name.to_string()));
    }
    if name.eq_ignore_ascii_case("redirect") {
        check_domain_spec("redirect", value)?;
        Ok(Modifier::Redirect(value.to_string()))
    } else if name.eq_ignore_ascii_case("exp") {
        check_domain_spec("exp", value)?;
        Ok(Modifier::Exp(value.to_string()))
    } else {
        macros::validate(value, MacroScope::Explanation)?;
        Ok(Modifier::Unknown {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

fn parse_mechanism(kind: MechanismKind, rest: &str) -> Result<Mechanism, RecordError> {
    let unexpected = || RecordError::UnexpectedArgument {
        mechanism: kind.name().to_string(),
    };
    match kind {
        MechanismKind::All => {
            if rest.is_empty() {
                Ok(Mechanism::All)
            } else {
                Err(unexpected())
            }
        }
        MechanismKind::Include | MechanismKind::Exists => {
            let domain_spec = required_domain_spec(kind, rest)?;
            Ok(if kind == MechanismKind::Include {
                Mechanism::Include { domain_spec }
            } else {
                Mechanism::Exists { domain_spec }
            })
        }
        MechanismKind::A | MechanismKind::Mx => {
            let (head, cidr) = split_dual_cidr(rest)?;
            let domain_spec = optional_domain_spec(kind, head)?;
            Ok(if kind == MechanismKind::A {
                Mechanism::A { domain_spec, cidr }
            } else {
                Mechanism::Mx { domain_spec, cidr }
            })
        }
        MechanismKind::Ptr => {
            if !rest.is_empty() && !rest.starts_with(':') {
                return Err(unexpected());
            }
            let domain_spec = optional_domain_spec(kind, rest)?;
            Ok(Mechanism::Ptr { domain_spec })
        }
        MechanismKind::Ip4 => {
            let value = rest
                .strip_prefix(':')
                .ok_or_else(|| RecordError::InvalidIp4(rest.to_string()))?;
            let (addr, prefix) = split_prefix(value);
            let network = Ipv4Addr::from_str(addr)
                .map_err(|_| RecordError::InvalidIp4(value.to_string()))?;
            let prefix = prefix
                .map(|prefix| parse_cidr_len(prefix, V4_MAX_PREFIX))
                .transpose()?;
            Ok(Mechanism::Ip4 { network, prefix })
        }
        MechanismKind::Ip6 => {
            let value = rest
                .strip_prefix(':')
                .ok_or_else(|| RecordError::InvalidIp6(rest.to_string()))?;
            let (addr, prefix) = split_prefix(value);
            let network = Ipv6Addr::from_str(addr)
                .map_err(|_| RecordError::InvalidIp6(value.to_string()))?;
            let prefix = prefix
                .map(|prefix| parse_cidr_len(prefix, V6_MAX_PREFIX))
                .transpose()?;
            Ok(Mechanism::Ip6 { network, prefix })
        }
    }
}

fn required_domain_spec(kind: MechanismKind, rest: &str) -> Result<String, RecordError> {
    optional_domain_spec(kind, rest)?.ok_or_else(|| RecordError::MissingDomainSpec {
        mechanism: kind.name().to_string(),
    })
}

/// `rest` is either empty or `:domain-spec`.
fn optional_domain_spec(kind: MechanismKind, rest: &str) -> Result<Option<String>, RecordError> {
    if rest.is_empty() {
        return Ok(None);
    }
    let Some(value) = rest.strip_prefix(':') else {
        return Err(RecordError::UnexpectedArgument {
            mechanism: kind.name().to_string(),
        });
    };
    check_domain_spec(kind.name(), value)?;
    Ok(Some(value.to_string()))
}

fn check_domain_spec(owner: &str, value: &str) -> Result<(), RecordError> {
    if value.is_empty() {
        return Err(RecordError::MissingDomainSpec {
            mechanism: owner.to_string(),
        });
    }
    macros::validate(value, MacroScope::DomainSpec)?;
    if macros::ends_with_macro(value) {
        return Ok(());
    }
    let invalid = |reason: &str| RecordError::InvalidDomainSpec {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let name = value.strip_suffix('.').unwrap_or(value);
    let Some((_, toplabel)) = name.rsplit_once('.') else {
        return Err(invalid("expected at least two labels"));
    };
    if !TOPLABEL.is_match(toplabel) {
        return Err(invalid("invalid top label"));
    }
    Ok(())
}

fn split_dual_cidr(rest: &str) -> Result<(&str, DualCidr), RecordError> {
    let Some(caps) = DUAL_CIDR.captures(rest) else {
        return Ok((rest, DualCidr::default()));
    };
    let head = caps.name("head").map_or("", |m| m.as_str());
    let v4 = caps
        .name("v4")
        .map(|m| parse_cidr_len(m.as_str(), V4_MAX_PREFIX))
        .transpose()?;
    let v6 = caps
        .name("v6")
        .map(|m| parse_cidr_len(m.as_str(), V6_MAX_PREFIX))
        .transpose()?;
    Ok((head, DualCidr { v4, v6 }))
}

fn split_prefix(value: &str) -> (&str, Option<&str>) {
    match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    }
}

fn parse_cidr_len(value: &str, max: u8) -> Result<u8, RecordError> {
    let invalid = || RecordError::InvalidCidr(value.to_string());
    if value.is_empty() || (value.len() > 1 && value.starts_with('0')) {
        return Err(invalid());
    }
    let len: u8 = value.parse().map_err(|_| invalid())?;
    if len > max {
        return Err(invalid());
    }
    Ok(len)
}

fn starts_with_ignore_ascii_case(input: &str, prefix: &str) -> bool {
    input
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests;
