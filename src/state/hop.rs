use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::lookup::private::is_private;

/// One address observed at a given distance from the probing host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopAddress {
    pub ttl: u8,
    /// None for a silent hop (no reply within the per-hop deadline)
    pub addr: Option<Ipv4Addr>,
    #[serde(with = "opt_duration_ms", default)]
    pub rtt: Option<Duration>,
}

impl HopAddress {
    pub fn new(ttl: u8, addr: Ipv4Addr, rtt: Option<Duration>) -> Self {
        Self {
            ttl,
            addr: Some(addr),
            rtt,
        }
    }

    pub fn silent(ttl: u8) -> Self {
        Self {
            ttl,
            addr: None,
            rtt: None,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.addr.is_none()
    }
}

/// Drop hops that answered from a private or reserved address.
///
/// Silent hops are kept so TTL numbering stays visible to the caller.
pub fn filter_private(hops: Vec<HopAddress>) -> Vec<HopAddress> {
    hops.into_iter()
        .filter(|hop| hop.addr.is_none_or(|ip| !is_private(ip)))
        .collect()
}

/// Number of hops that actually answered
pub fn responding_count(hops: &[HopAddress]) -> usize {
    hops.iter().filter(|h| !h.is_silent()).count()
}

/// RTT as fractional milliseconds
mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(rtt: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rtt.map(|d| d.as_secs_f64() * 1000.0).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<f64>::deserialize(deserializer)?;
        Ok(ms.and_then(|v| Duration::try_from_secs_f64(v / 1000.0).ok()))
    }
}
