use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse route quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Premium,
    Quality,
    Regular,
    Unknown,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Premium => "Premium",
            Self::Quality => "Quality",
            Self::Regular => "Regular",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label())
    }
}

/// Parent operator group of a backbone ASN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierFamily {
    Telecom,
    Unicom,
    Mobile,
}

impl CarrierFamily {
    /// Short code: CT, CU or CM
    pub fn code(&self) -> &'static str {
        match self {
            Self::Telecom => "CT",
            Self::Unicom => "CU",
            Self::Mobile => "CM",
        }
    }
}

impl fmt::Display for CarrierFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Resolved identity of an address's autonomous system.
///
/// Records are never mutated once created; a re-resolution builds a new
/// record that replaces the cached one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierRecord {
    /// Digits only, no "AS" prefix
    pub asn: String,
    pub name: String,
    pub description: String,
    pub tier: Tier,
    pub prefix: Option<String>,
    pub whois: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<CarrierFamily>,
    /// Upstream paths the remote service reported for this ASN
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
}

impl CarrierRecord {
    /// "AS4809" style label
    pub fn as_label(&self) -> String {
        format!("AS{}", self.asn)
    }

    pub fn with_routes(mut self, routes: Vec<String>) -> Self {
        self.routes = routes;
        self
    }

    /// Numeric ASN for ordering; unparsable values sort last
    pub fn asn_number(&self) -> u32 {
        self.asn.parse().unwrap_or(u32::MAX)
    }
}

/// One deduplicated carrier appearance within a destination's route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub carrier: CarrierRecord,
    pub tier: Tier,
    /// Higher ranks first
    pub priority: i32,
}

impl RouteSegment {
    /// Text shown by the presentation layer, e.g. "CN2 GIA [Premium]"
    pub fn display_text(&self) -> String {
        format!("{} {}", self.carrier.name, self.tier)
    }
}
