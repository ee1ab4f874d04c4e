use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::carrier::RouteSegment;

/// Lifecycle of one destination inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Pending,
    Probing,
    Classifying,
    Done,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Probing => "probing",
            Self::Classifying => "classifying",
            Self::Done => "done",
        }
    }
}

/// Terminal status of a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    /// The batch deadline expired while the destination was still in `phase`
    PartialTimeout { phase: Phase },
    Failed { reason: String },
}

impl ProbeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome for one configured destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Position in the configured destination list
    pub index: usize,
    pub label: String,
    /// Host as configured (IP or hostname)
    pub host: String,
    /// Resolved IPv4 address, if resolution got that far
    pub address: Option<Ipv4Addr>,
    /// Ordered by descending priority, then ascending ASN
    pub segments: Vec<RouteSegment>,
    /// Hops discovered before classification (after private filtering)
    pub hop_count: usize,
    /// TTL where a convergence layer was detected, if any
    pub convergence_ttl: Option<u8>,
    /// The route mixes operator families; grading may be off
    #[serde(default)]
    pub multi_carrier: bool,
    #[serde(flatten)]
    pub status: ProbeStatus,
}

impl ProbeResult {
    pub fn failed(index: usize, label: &str, host: &str, reason: impl Into<String>) -> Self {
        Self {
            index,
            label: label.to_string(),
            host: host.to_string(),
            address: None,
            segments: Vec::new(),
            hop_count: 0,
            convergence_ttl: None,
            multi_carrier: false,
            status: ProbeStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    /// A successful probe with no recognisable carrier
    pub fn no_known_route(&self) -> bool {
        self.status.is_success() && self.segments.is_empty()
    }
}
