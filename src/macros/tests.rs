use std::net::IpAddr;

use super::{MacroContext, MacroScope, expand, needs_validated_name, validate};
use crate::error::MacroError;

const SENDER: &str = "strong-bad@email.example.com";
const DOMAIN: &str = "email.example.com";

fn v4_ctx() -> MacroContext<'static> {
    let ip: IpAddr = "192.0.2.3".parse().unwrap();
    MacroContext::new(SENDER, DOMAIN, ip, "mx.example.org")
}

fn v6_ctx() -> MacroContext<'static> {
    let ip: IpAddr = "2001:db8::cb01".parse().unwrap();
    MacroContext::new(SENDER, DOMAIN, ip, "mx.example.org")
}

fn domain_spec(template: &str, ctx: &MacroContext<'_>) -> String {
    expand(template, ctx, MacroScope::DomainSpec).expect("template expands")
}

#[test]
fn sender_letters() {
    let ip: IpAddr = "192.0.2.1".parse().unwrap();
    let ctx = MacroContext::new("user@example.com", "example.com", ip, "helo.example.com");
    assert_eq!(domain_spec("%{s}", &ctx), "user@example.com");
    assert_eq!(domain_spec("%{l}", &ctx), "user");
    assert_eq!(domain_spec("%{o}", &ctx), "example.com");
    assert_eq!(domain_spec("%{h}", &ctx), "helo.example.com");
}

#[test]
fn rfc7208_domain_transformers() {
    let ctx = v4_ctx();
    let cases = [
        ("%{d}", "email.example.com"),
        ("%{d4}", "email.example.com"),
        ("%{d3}", "email.example.com"),
        ("%{d2}", "example.com"),
        ("%{d1}", "com"),
        ("%{dr}", "com.example.email"),
        ("%{d2r}", "example.email"),
        ("%{l}", "strong-bad"),
        ("%{l-}", "strong.bad"),
        ("%{lr}", "strong-bad"),
        ("%{lr-}", "bad.strong"),
        ("%{l1r-}", "strong"),
    ];
    for (template, expected) in cases {
        assert_eq!(domain_spec(template, &ctx), expected, "template {template}");
    }
}

#[test]
fn rfc7208_composite_examples() {
    let ctx = v4_ctx();
    assert_eq!(
        domain_spec("%{ir}.%{v}._spf.%{d2}", &ctx),
        "3.2.0.192.in-addr._spf.example.com"
    );
    assert_eq!(
        domain_spec("%{lr-}.lp._spf.%{d2}", &ctx),
        "bad.strong.lp._spf.example.com"
    );
    assert_eq!(
        domain_spec("%{ir}.%{v}.%{l1r-}.lp._spf.%{d2}", &ctx),
        "3.2.0.192.in-addr.strong.lp._spf.example.com"
    );
    assert_eq!(
        domain_spec("%{d2}.trusted-domains.example.net", &ctx),
        "example.com.trusted-domains.example.net"
    );
}

#[test]
fn ipv6_nibbles() {
    let ctx = v6_ctx();
    assert_eq!(
        domain_spec("%{ir}.%{v}._spf.%{d2}", &ctx),
        "1.0.b.c.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6._spf.example.com"
    );
}

#[test]
fn escapes() {
    let ctx = v4_ctx();
    let out = expand("100%% sure%_now%-ok", &ctx, MacroScope::Explanation).unwrap();
    assert_eq!(out, "100% sure now%20ok");
}

#[test]
fn uppercase_letters_url_encode() {
    let ctx = v4_ctx();
    assert_eq!(domain_spec("%{S}", &ctx), "strong-bad%40email.example.com");
}

#[test]
fn validated_name_defaults_to_unknown() {
    let ctx = v4_ctx();
    assert_eq!(domain_spec("%{p}", &ctx), "unknown");
    let ctx = v4_ctx().with_validated_name(Some("mail.example.com"));
    assert_eq!(domain_spec("%{p2}", &ctx), "example.com");
    assert!(needs_validated_name("%{p}.example.com"));
    assert!(!needs_validated_name("%{d}.example.com"));
}

#[test]
fn explanation_letters() {
    let ctx = v4_ctx().with_receiving_domain("mx.receiver.example");
    let out = expand("%{c} via %{r}", &ctx, MacroScope::Explanation).unwrap();
    assert_eq!(out, "192.0.2.3 via mx.receiver.example");
    let ts = expand("%{t}", &ctx, MacroScope::Explanation).unwrap();
    assert!(ts.parse::<u64>().is_ok(), "{ts}");

    let err = expand("%{c}", &ctx, MacroScope::DomainSpec).expect_err("c outside exp");
    assert_eq!(err, MacroError::ExplanationOnly('c'));
}

#[test]
fn malformed_templates_rejected() {
    let scope = MacroScope::DomainSpec;
    assert_eq!(validate("%{x}", scope), Err(MacroError::UnknownLetter('x')));
    assert_eq!(validate("%{d", scope), Err(MacroError::Unterminated));
    assert_eq!(validate("abc%", scope), Err(MacroError::TrailingPercent));
    assert_eq!(validate("%a", scope), Err(MacroError::InvalidEscape('a')));
    assert_eq!(validate("%{}", scope), Err(MacroError::Empty));
    assert!(matches!(
        validate("%{d0}", scope),
        Err(MacroError::InvalidTransformer(_))
    ));
    assert!(matches!(
        validate("%{d2x}", scope),
        Err(MacroError::InvalidTransformer(_))
    ));
    assert!(validate("%{d2r+-}.example.com", scope).is_ok());
}
