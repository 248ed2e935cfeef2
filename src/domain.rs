//! Domain name helpers: IDNA normalisation, FQDN checks, and the label
//! arithmetic SPF needs for `ptr` and macro-expanded names.

use crate::error::SpfError;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalises `domain` to lowercase ASCII (IDNA) and checks it is a
/// multi-label FQDN.
pub(crate) fn normalize_domain(domain: &str) -> Result<String, SpfError> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(SpfError::EmptyDomain);
    }
    let ascii = idna::domain_to_ascii(trimmed).map_err(|err| SpfError::idna(trimmed, err))?;
    check_fqdn(&ascii).map_err(|reason| SpfError::invalid_domain(&ascii, reason))?;
    Ok(ascii)
}

/// Label checks from RFC 7208 §4.3. Underscore-prefixed labels such as
/// `_spf` are accepted.
pub(crate) fn check_fqdn(domain: &str) -> Result<(), String> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        return Err("empty domain".to_string());
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(format!("length {} > {MAX_DOMAIN_LEN}", domain.len()));
    }
    if !domain.contains('.') {
        return Err("domain must contain at least one dot".to_string());
    }
    for label in domain.split('.') {
        if label.is_empty() {
            return Err("empty domain label".to_string());
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!(
                "domain label '{}' length {} > {MAX_LABEL_LEN}",
                label,
                label.len()
            ));
        }
        if label.chars().any(|c| c.is_ascii_whitespace() || c.is_ascii_control()) {
            return Err(format!("domain label '{}' has invalid chars", label));
        }
    }
    Ok(())
}

pub(crate) fn is_valid_fqdn(domain: &str) -> bool {
    check_fqdn(domain).is_ok()
}

/// Drops leading labels until the name fits in 253 octets (RFC 7208 §7.3).
pub(crate) fn truncate_domain(domain: &str) -> &str {
    let mut current = domain;
    while current.len() > MAX_DOMAIN_LEN {
        match current.split_once('.') {
            Some((_, rest)) => current = rest,
            None => break,
        }
    }
    current
}

/// Splits an envelope sender into `(local-part, domain)`. A bare domain or an
/// empty local part yields `postmaster`.
pub(crate) fn split_sender(sender: &str) -> (&str, &str) {
    let trimmed = sender.trim();
    match trimmed.rsplit_once('@') {
        Some(("", domain)) => ("postmaster", domain),
        Some((local, domain)) => (local, domain),
        None => ("postmaster", trimmed),
    }
}

/// `true` when `name` equals `parent` or sits below it.
pub(crate) fn is_same_or_subdomain(name: &str, parent: &str) -> bool {
    let name = name.trim_end_matches('.');
    let parent = parent.trim_end_matches('.');
    if name.eq_ignore_ascii_case(parent) {
        return true;
    }
    name.len() > parent.len() + 1
        && name.as_bytes()[name.len() - parent.len() - 1] == b'.'
        && name[name.len() - parent.len()..].eq_ignore_ascii_case(parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_trims_dot() {
        let out = normalize_domain(" Example.COM. ").expect("valid domain");
        assert_eq!(out, "example.com");
    }

    #[test]
    fn normalize_converts_idn() {
        let out = normalize_domain("exämple.com").expect("valid domain");
        assert!(out.starts_with("xn--"), "{out}");
    }

    #[test]
    fn normalize_rejects_empty_and_single_label() {
        assert!(matches!(normalize_domain(" "), Err(SpfError::EmptyDomain)));
        assert!(matches!(
            normalize_domain("localhost"),
            Err(SpfError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn label_too_long() {
        let long = "a".repeat(64);
        assert!(check_fqdn(&format!("{}.com", long)).is_err());
        assert!(check_fqdn("_spf.example.com").is_ok());
    }

    #[test]
    fn truncation_keeps_rightmost_labels() {
        let long = format!("{}.example.com", "abcdefghij.".repeat(30));
        let out = truncate_domain(&long);
        assert!(out.len() <= 253);
        assert!(out.ends_with("example.com"));
        assert_eq!(truncate_domain("example.com"), "example.com");
    }

    #[test]
    fn sender_split_defaults_local_part() {
        assert_eq!(split_sender("user@example.com"), ("user", "example.com"));
        assert_eq!(split_sender("@example.com"), ("postmaster", "example.com"));
        assert_eq!(split_sender("example.com"), ("postmaster", "example.com"));
    }

    #[test]
    fn subdomain_matching() {
        assert!(is_same_or_subdomain("mail.example.com", "example.com"));
        assert!(is_same_or_subdomain("Example.com.", "example.COM"));
        assert!(!is_same_or_subdomain("badexample.com", "example.com"));
        assert!(!is_same_or_subdomain("example.com", "mail.example.com"));
    }
}
