#![forbid(unsafe_code)]
//! spfcheck_lib — Sender Policy Framework evaluation (RFC 7208)
//!
//! [`SpfClient`] answers "may this IP send mail for this domain?" by walking
//! the domain's published policy through an [`SpfResolver`].

mod cidr;
mod domain;

pub mod client;
pub mod error;
pub mod eval;
pub mod macros;
pub mod options;
pub mod record;
pub mod resolver;
pub mod result;

pub use client::{QueryOutcome, SpfClient};
pub use error::{MacroError, RecordError, SpfError};
pub use eval::{Evaluation, Evaluator, LookupBudget, Request};
pub use macros::{MacroContext, MacroScope, expand as expand_macro};
pub use options::SpfOptions;
pub use record::{
    Directive, DualCidr, Mechanism, MechanismKind, Modifier, PolicyRecord, Qualifier, Term,
    parse_answers, select_record,
};
#[cfg(feature = "with-dns")]
pub use resolver::system_resolver;
pub use resolver::{CachingResolver, DnsError, MxRecord, SpfResolver};
pub use result::{SpfResult, UnknownResult};
