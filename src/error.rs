//! Error taxonomy for lookups and probes.
//!
//! Per-hop and per-lookup errors are absorbed by the classifier and the
//! probe plan; only probe-level failures reach a `ProbeResult`.

use std::time::Duration;
use thiserror::Error;

/// Failure to resolve an address to a carrier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Address is private or reserved. This is a filtering signal, not a failure.
    #[error("private or reserved address")]
    PrivateAddress,

    /// Remote lookup did not answer in time
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Remote payload could not be interpreted
    #[error("malformed lookup response: {0}")]
    Malformed(String),

    /// No announced ASN for this address
    #[error("no ASN found for {0}")]
    NoAsnFound(String),

    /// Connection-level failure talking to a remote service
    #[error("lookup transport error: {0}")]
    Transport(String),
}

impl LookupError {
    /// True for errors that only mean "skip this hop quietly"
    pub fn is_filter_signal(&self) -> bool {
        matches!(self, Self::PrivateAddress)
    }
}

/// Timeouts are not mapped here: only the caller knows the deadline it set,
/// see `RipeLookup`.
impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Failure of a whole hop-discovery run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Non-timeout socket failure; fatal to this probe only
    #[error("socket error: {0}")]
    Socket(String),

    /// No hop answered within the TTL ceiling
    #[error("no hops discovered")]
    NoHops,

    /// External trace tool is missing or unusable (triggers fallback)
    #[error("external trace tool unavailable: {0}")]
    ToolUnavailable(String),

    /// Probe stopped because the batch gave up on it
    #[error("probe cancelled")]
    Cancelled,
}

impl ProbeError {
    /// True when the next strategy in the plan should be tried
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::ToolUnavailable(_) | Self::NoHops)
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        Self::Socket(e.to_string())
    }
}
