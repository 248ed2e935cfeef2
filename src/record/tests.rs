use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;

use super::{
    Directive, DualCidr, Mechanism, Modifier, PolicyRecord, Qualifier, Term, parse_answers,
    select_record,
};
use crate::error::{MacroError, RecordError};

fn answers(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn parse(record: &str) -> PolicyRecord {
    PolicyRecord::parse(record).unwrap_or_else(|err| panic!("{record}: {err}"))
}

#[test]
fn selection_ignores_unrelated_txt() {
    let txt = answers(&["google-site-verification=abc", "v=spf1 -all", "v=spf10 +all"]);
    assert_eq!(select_record(&txt), Ok(Some("v=spf1 -all")));
    assert_eq!(select_record(&answers(&["v=DMARC1; p=none"])), Ok(None));
    assert_eq!(select_record(&[]), Ok(None));
}

#[test]
fn selection_accepts_bare_version_and_case() {
    assert_eq!(select_record(&answers(&["V=SPF1"])), Ok(Some("V=SPF1")));
    let record = parse_answers(&answers(&["v=spf1"])).unwrap().unwrap();
    assert!(record.terms().is_empty());
}

#[test]
fn multiple_records_are_ambiguous() {
    let txt = answers(&["v=spf1 -all", "v=spf1 +all"]);
    assert_eq!(
        parse_answers(&txt),
        Err(RecordError::MultipleRecords { count: 2 })
    );
}

#[test]
fn qualifiers_default_to_pass() {
    let record = parse("v=spf1 a -mx ~ptr ?all");
    let qualifiers: Vec<Qualifier> = record.directives().map(|d| d.qualifier).collect();
    assert_eq!(
        qualifiers,
        vec![
            Qualifier::Pass,
            Qualifier::Fail,
            Qualifier::SoftFail,
            Qualifier::Neutral
        ]
    );
}

#[test]
fn ip_networks_are_parsed() {
    let record = parse("v=spf1 ip4:192.0.2.0/24 ip6:2001:db8::/32 ip4:198.51.100.7");
    let mechanisms: Vec<&Mechanism> = record.directives().map(|d| &d.mechanism).collect();
    assert_eq!(
        mechanisms[0],
        &Mechanism::Ip4 {
            network: Ipv4Addr::new(192, 0, 2, 0),
            prefix: Some(24)
        }
    );
    assert_eq!(
        mechanisms[1],
        &Mechanism::Ip6 {
            network: "2001:db8::".parse::<Ipv6Addr>().unwrap(),
            prefix: Some(32)
        }
    );
    assert_eq!(
        mechanisms[2],
        &Mechanism::Ip4 {
            network: Ipv4Addr::new(198, 51, 100, 7),
            prefix: None
        }
    );
}

#[test]
fn a_and_mx_dual_cidr_forms() {
    let record = parse("v=spf1 a a/24 a:example.com a:example.com/24//64 mx//64 mx:mail.example.com/28");
    let mechanisms: Vec<Mechanism> = record.directives().map(|d| d.mechanism.clone()).collect();
    assert_eq!(
        mechanisms,
        vec![
            Mechanism::A {
                domain_spec: None,
                cidr: DualCidr::default()
            },
            Mechanism::A {
                domain_spec: None,
                cidr: DualCidr {
                    v4: Some(24),
                    v6: None
                }
            },
            Mechanism::A {
                domain_spec: Some("example.com".to_string()),
                cidr: DualCidr::default()
            },
            Mechanism::A {
                domain_spec: Some("example.com".to_string()),
                cidr: DualCidr {
                    v4: Some(24),
                    v6: Some(64)
                }
            },
            Mechanism::Mx {
                domain_spec: None,
                cidr: DualCidr {
                    v4: None,
                    v6: Some(64)
                }
            },
            Mechanism::Mx {
                domain_spec: Some("mail.example.com".to_string()),
                cidr: DualCidr {
                    v4: Some(28),
                    v6: None
                }
            },
        ]
    );
}

#[test]
fn modifiers_keep_source_order() {
    let record = parse("v=spf1 exp=explain.%{d} include:_spf.example.net moo=cow redirect=_spf.example.org");
    assert_eq!(record.explanation(), Some("explain.%{d}"));
    assert_eq!(record.redirect(), Some("_spf.example.org"));
    assert!(matches!(record.terms()[0], Term::Modifier(Modifier::Exp(_))));
    assert!(matches!(
        &record.terms()[2],
        Term::Modifier(Modifier::Unknown { name, value }) if name == "moo" && value == "cow"
    ));
}

#[test]
fn macro_domain_specs_accepted() {
    let record = parse("v=spf1 exists:%{ir}.%{l1r+-}._spf.%{d} include:%{d2}.example.net -all");
    assert_eq!(record.directives().count(), 3);
}

#[test]
fn malformed_terms_reject_whole_record() {
    let cases = [
        ("v=spf1 foo -all", "unknown mechanism"),
        ("v=spf1 all:example.com", "argument"),
        ("v=spf1 include", "domain-spec"),
        ("v=spf1 include:", "domain-spec"),
        ("v=spf1 ip4:192.0.2.300", "IPv4"),
        ("v=spf1 ip4:192.0.2.0/33", "CIDR"),
        ("v=spf1 ip6:2001:db8::/129", "CIDR"),
        ("v=spf1 ip6:192.0.2.1", "IPv6"),
        ("v=spf1 a/024", "CIDR"),
        ("v=spf1 a:localhost", "domain-spec"),
        ("v=spf1 ptr/24", "argument"),
        ("v=spf1 -redirect=example.com", "qualifier"),
        ("v=spf1 redirect=a.example.com redirect=b.example.com", "more than once"),
        ("v=spf1 exp=a.example.com exp=b.example.com", "more than once"),
        ("v=spf1 9x=y", "modifier name"),
    ];
    for (record, needle) in cases {
        let err = PolicyRecord::parse(record).expect_err(record);
        assert!(err.to_string().contains(needle), "{record}: {err}");
    }
}

#[test]
fn macro_errors_surface() {
    let err = PolicyRecord::parse("v=spf1 include:%{q}.example.com").expect_err("bad letter");
    assert_eq!(err, RecordError::Macro(MacroError::UnknownLetter('q')));
    let err = PolicyRecord::parse("v=spf1 exists:%{c}.example.com").expect_err("exp only");
    assert_eq!(err, RecordError::Macro(MacroError::ExplanationOnly('c')));
}

#[test]
fn version_must_lead() {
    assert_eq!(
        PolicyRecord::parse("spf1 -all"),
        Err(RecordError::InvalidVersion)
    );
    assert_eq!(PolicyRecord::parse(""), Err(RecordError::InvalidVersion));
}

#[test]
fn display_normalizes_record() {
    let record = parse("V=SPF1   +a:Mail.Example.com/24  -ip6:2001:DB8:0::/48 ?exists:%{i}.bl.example.org ~all");
    insta::assert_snapshot!(
        record.to_string(),
        @"v=spf1 a:Mail.Example.com/24 -ip6:2001:db8::/48 ?exists:%{i}.bl.example.org ~all"
    );
}

fn qualifier_strategy() -> impl Strategy<Value = Qualifier> {
    prop_oneof![
        Just(Qualifier::Pass),
        Just(Qualifier::Fail),
        Just(Qualifier::SoftFail),
        Just(Qualifier::Neutral),
    ]
}

fn domain_strategy() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9]{0,8}", "[a-z]{2,6}").prop_map(|(label, tld)| format!("{label}.{tld}"))
}

fn mechanism_strategy() -> impl Strategy<Value = Mechanism> {
    prop_oneof![
        Just(Mechanism::All),
        domain_strategy().prop_map(|domain_spec| Mechanism::Include { domain_spec }),
        domain_strategy().prop_map(|domain_spec| Mechanism::Exists { domain_spec }),
        (
            proptest::option::of(domain_strategy()),
            proptest::option::of(0u8..=32),
            proptest::option::of(0u8..=128)
        )
            .prop_map(|(domain_spec, v4, v6)| Mechanism::A {
                domain_spec,
                cidr: DualCidr { v4, v6 }
            }),
        (
            proptest::option::of(domain_strategy()),
            proptest::option::of(0u8..=32)
        )
            .prop_map(|(domain_spec, v4)| Mechanism::Mx {
                domain_spec,
                cidr: DualCidr { v4, v6: None }
            }),
        proptest::option::of(domain_strategy())
            .prop_map(|domain_spec| Mechanism::Ptr { domain_spec }),
        (any::<u32>(), proptest::option::of(0u8..=32)).prop_map(|(addr, prefix)| {
            Mechanism::Ip4 {
                network: Ipv4Addr::from(addr),
                prefix,
            }
        }),
        (any::<u128>(), proptest::option::of(0u8..=128)).prop_map(|(addr, prefix)| {
            Mechanism::Ip6 {
                network: Ipv6Addr::from(addr),
                prefix,
            }
        }),
    ]
}

fn term_strategy() -> impl Strategy<Value = Term> {
    prop_oneof![
        4 => (qualifier_strategy(), mechanism_strategy()).prop_map(|(qualifier, mechanism)| {
            Term::Directive(Directive {
                qualifier,
                mechanism,
            })
        }),
        1 => ("[a-z][a-z0-9]{0,6}", "[a-z0-9.]{0,10}").prop_filter_map(
            "reserved modifier names",
            |(name, value)| {
                (name != "redirect" && name != "exp")
                    .then_some(Term::Modifier(Modifier::Unknown { name, value }))
            }
        ),
    ]
}

proptest! {
    #[test]
    fn serialize_then_reparse_is_stable(terms in proptest::collection::vec(term_strategy(), 0..12)) {
        let record = PolicyRecord::new(terms);
        let rendered = record.to_string();
        let reparsed = PolicyRecord::parse(&rendered).expect("rendered record parses");
        prop_assert_eq!(&reparsed, &record);
        prop_assert_eq!(reparsed.to_string(), rendered);
    }
}
