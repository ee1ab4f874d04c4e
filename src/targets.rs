use serde::{Deserialize, Serialize};

/// A configured probe destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub label: String,
    /// IPv4 literal or hostname
    pub host: String,
}

impl Destination {
    pub fn new(label: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
        }
    }

    /// Parse "LABEL=HOST" or a bare host, which then labels itself
    pub fn parse(s: &str) -> Self {
        match s.split_once('=') {
            Some((label, host)) if !label.trim().is_empty() => Self::new(label.trim(), host.trim()),
            Some((_, host)) => Self::new(host.trim(), host.trim()),
            None => Self::new(s.trim(), s.trim()),
        }
    }
}

/// Backbone entry points, four cities × three carriers
pub const DEFAULT_DESTINATIONS: &[(&str, &str)] = &[
    ("Beijing Telecom", "219.141.140.10"),
    ("Beijing Unicom", "202.106.195.68"),
    ("Beijing Mobile", "221.179.155.161"),
    ("Shanghai Telecom", "202.96.209.133"),
    ("Shanghai Unicom", "210.22.97.1"),
    ("Shanghai Mobile", "211.136.112.200"),
    ("Guangzhou Telecom", "58.60.188.222"),
    ("Guangzhou Unicom", "210.21.196.6"),
    ("Guangzhou Mobile", "120.196.165.24"),
    ("Chengdu Telecom", "61.139.2.69"),
    ("Chengdu Unicom", "119.6.6.6"),
    ("Chengdu Mobile", "211.137.96.205"),
];

pub fn default_destinations() -> Vec<Destination> {
    DEFAULT_DESTINATIONS
        .iter()
        .map(|(label, host)| Destination::new(*label, *host))
        .collect()
}
