//! SPF macro-strings (RFC 7208 §7).
//!
//! A template is first parsed into [`Segment`]s, which is also how the record
//! parser validates domain-specs, then rendered against a [`MacroContext`].
//! Rendering never touches DNS: the validated `%{p}` name has to be resolved by
//! the caller beforehand.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::MacroError;

const DELIMITERS: &[char] = &['.', '-', '+', ',', '/', '_', '='];

/// Where a macro-string appears. Letters `c`, `r` and `t` are reserved to
/// explanation strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroScope {
    DomainSpec,
    Explanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MacroLetter {
    Sender,
    LocalPart,
    SenderDomain,
    Domain,
    Ip,
    ValidatedName,
    IpVersion,
    Helo,
    ClientIp,
    Receiver,
    Timestamp,
}

impl MacroLetter {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            's' => Some(Self::Sender),
            'l' => Some(Self::LocalPart),
            'o' => Some(Self::SenderDomain),
            'd' => Some(Self::Domain),
            'i' => Some(Self::Ip),
            'p' => Some(Self::ValidatedName),
            'v' => Some(Self::IpVersion),
            'h' => Some(Self::Helo),
            'c' => Some(Self::ClientIp),
            'r' => Some(Self::Receiver),
            't' => Some(Self::Timestamp),
            _ => None,
        }
    }

    fn explanation_only(self) -> bool {
        matches!(self, Self::ClientIp | Self::Receiver | Self::Timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MacroExpr {
    pub letter: MacroLetter,
    pub url_encode: bool,
    pub keep: Option<usize>,
    pub reverse: bool,
    pub delimiters: Vec<char>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Macro(MacroExpr),
}

/// Request data a macro-string can refer to.
#[derive(Debug, Clone)]
pub struct MacroContext<'a> {
    pub sender: &'a str,
    pub local_part: &'a str,
    pub sender_domain: &'a str,
    pub domain: &'a str,
    pub client_ip: IpAddr,
    pub helo: &'a str,
    pub validated_name: Option<&'a str>,
    pub receiving_domain: &'a str,
}

impl<'a> MacroContext<'a> {
    /// Builds a context from an envelope sender (`local@domain`) for the
    /// domain currently being evaluated.
    pub fn new(sender: &'a str, domain: &'a str, client_ip: IpAddr, helo: &'a str) -> Self {
        let (local_part, sender_domain) = crate::domain::split_sender(sender);
        Self {
            sender,
            local_part,
            sender_domain,
            domain,
            client_ip,
            helo,
            validated_name: None,
            receiving_domain: "unknown",
        }
    }

    pub fn with_validated_name(mut self, name: Option<&'a str>) -> Self {
        self.validated_name = name;
        self
    }

    pub fn with_receiving_domain(mut self, domain: &'a str) -> Self {
        self.receiving_domain = domain;
        self
    }

    fn value(&self, letter: MacroLetter) -> String {
        match letter {
            MacroLetter::Sender => self.sender.to_string(),
            MacroLetter::LocalPart => self.local_part.to_string(),
            MacroLetter::SenderDomain => self.sender_domain.to_string(),
            MacroLetter::Domain => self.domain.to_string(),
            MacroLetter::Ip => dotted_ip(self.client_ip),
            MacroLetter::ValidatedName => self.validated_name.unwrap_or("unknown").to_string(),
            MacroLetter::IpVersion => match self.client_ip {
                IpAddr::V4(_) => "in-addr".to_string(),
                IpAddr::V6(_) => "ip6".to_string(),
            },
            MacroLetter::Helo => self.helo.to_string(),
            MacroLetter::ClientIp => self.client_ip.to_string(),
            MacroLetter::Receiver => self.receiving_domain.to_string(),
            MacroLetter::Timestamp => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
                .to_string(),
        }
    }
}

/// Parses and expands `template` in one step.
pub fn expand(
    template: &str,
    ctx: &MacroContext<'_>,
    scope: MacroScope,
) -> Result<String, MacroError> {
    let segments = parse(template, scope)?;
    Ok(render(&segments, ctx))
}

/// Syntax check only; used by the record parser on every domain-spec.
pub fn validate(template: &str, scope: MacroScope) -> Result<(), MacroError> {
    parse(template, scope).map(|_| ())
}

/// `true` when the template needs the validated client name (`%{p}`).
pub(crate) fn needs_validated_name(template: &str) -> bool {
    parse(template, MacroScope::Explanation)
        .map(|segments| {
            segments.iter().any(|segment| {
                matches!(segment, Segment::Macro(expr) if expr.letter == MacroLetter::ValidatedName)
            })
        })
        .unwrap_or(false)
}

/// `true` when the template ends in a macro expansion rather than a literal
/// top label.
pub(crate) fn ends_with_macro(template: &str) -> bool {
    parse(template, MacroScope::Explanation)
        .map(|segments| matches!(segments.last(), Some(Segment::Macro(_))))
        .unwrap_or(false)
}

pub(crate) fn parse(template: &str, scope: MacroScope) -> Result<Vec<Segment>, MacroError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => literal.push('%'),
            Some('_') => literal.push(' '),
            Some('-') => literal.push_str("%20"),
            Some('{') => {
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(MacroError::Unterminated);
                }
                let expr = parse_expr(&body, scope)?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Macro(expr));
            }
            Some(other) => return Err(MacroError::InvalidEscape(other)),
            None => return Err(MacroError::TrailingPercent),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_expr(body: &str, scope: MacroScope) -> Result<MacroExpr, MacroError> {
    let mut chars = body.chars();
    let first = chars.next().ok_or(MacroError::Empty)?;
    let letter = MacroLetter::from_char(first).ok_or(MacroError::UnknownLetter(first))?;
    if letter.explanation_only() && scope != MacroScope::Explanation {
        return Err(MacroError::ExplanationOnly(first));
    }

    let rest = chars.as_str();
    let digits_len = rest.chars().take_while(char::is_ascii_digit).count();
    let (digits, rest) = rest.split_at(digits_len);
    let keep = if digits.is_empty() {
        None
    } else {
        match digits.parse::<usize>() {
            Ok(0) | Err(_) => return Err(MacroError::InvalidTransformer(body.to_string())),
            Ok(n) => Some(n),
        }
    };

    let (reverse, rest) = match rest.strip_prefix(['r', 'R']) {
        Some(tail) => (true, tail),
        None => (false, rest),
    };

    let delimiters: Vec<char> = rest.chars().collect();
    if delimiters.iter().any(|c| !DELIMITERS.contains(c)) {
        return Err(MacroError::InvalidTransformer(body.to_string()));
    }

    Ok(MacroExpr {
        letter,
        url_encode: first.is_ascii_uppercase(),
        keep,
        reverse,
        delimiters,
    })
}

fn render(segments: &[Segment], ctx: &MacroContext<'_>) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Macro(expr) => {
                let value = transform(&ctx.value(expr.letter), expr);
                if expr.url_encode {
                    out.push_str(&url_encode(&value));
                } else {
                    out.push_str(&value);
                }
            }
        }
    }
    out
}

fn transform(value: &str, expr: &MacroExpr) -> String {
    let is_delimiter = |c: char| {
        if expr.delimiters.is_empty() {
            c == '.'
        } else {
            expr.delimiters.contains(&c)
        }
    };
    let mut parts: Vec<&str> = value.split(is_delimiter).collect();
    if expr.reverse {
        parts.reverse();
    }
    if let Some(keep) = expr.keep {
        if parts.len() > keep {
            parts.drain(..parts.len() - keep);
        }
    }
    parts.join(".")
}

fn dotted_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => v6
            .octets()
            .iter()
            .flat_map(|byte| [byte >> 4, byte & 0x0f])
            .map(|nibble| format!("{nibble:x}"))
            .collect::<Vec<_>>()
            .join("."),
    }
}

fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests;
