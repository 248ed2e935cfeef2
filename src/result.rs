use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Outcome of an SPF evaluation (RFC 7208 §2.6).
///
/// `Invalid` never comes out of a policy evaluation: it only reports a query
/// that was rejected locally before any DNS work started.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpfResult {
    Pass,
    Fail,
    SoftFail,
    Neutral,
    PermError,
    TempError,
    None,
    Invalid,
}

impl SpfResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::SoftFail => "softfail",
            Self::Neutral => "neutral",
            Self::PermError => "permerror",
            Self::TempError => "temperror",
            Self::None => "none",
            Self::Invalid => "invalid",
        }
    }

    /// `true` for the results that report a problem rather than a policy
    /// decision.
    pub fn is_error(self) -> bool {
        matches!(self, Self::PermError | Self::TempError | Self::Invalid)
    }
}

impl fmt::Display for SpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown SPF result '{0}'")]
pub struct UnknownResult(pub String);

impl FromStr for SpfResult {
    type Err = UnknownResult;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "softfail" => Ok(Self::SoftFail),
            "neutral" => Ok(Self::Neutral),
            "permerror" => Ok(Self::PermError),
            "temperror" => Ok(Self::TempError),
            "none" => Ok(Self::None),
            "invalid" => Ok(Self::Invalid),
            other => Err(UnknownResult(other.to_string())),
        }
    }
}
