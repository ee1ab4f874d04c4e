//! Address → carrier resolution.
//!
//! Order per address: private filter, shared cache, then each configured
//! strategy in turn. The first strategy that produces an ASN wins and its
//! record is written to the cache before returning.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::cache::AsnCache;
use super::private::is_private;
use super::rules;
use super::sanitize_display;
use crate::error::LookupError;
use crate::state::CarrierRecord;

/// Anything that can turn an address into a carrier record.
///
/// The route classifier only sees this trait, so tests can drive it with a
/// table-backed fake.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, ip: Ipv4Addr) -> Result<CarrierRecord, LookupError>;
}

/// Raw answer from a remote service, before tier rules are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAnswer {
    /// Canonical digit string
    pub asn: String,
    pub prefix: Option<String>,
    pub whois: Option<String>,
    pub owner: Option<String>,
    /// Upstream paths keyed by ASN, when the service reports them
    pub router: HashMap<String, Vec<String>>,
}

/// A remote source of ASN data (HTTP, WebSocket, DNS)
#[async_trait]
pub trait RemoteLookup: Send + Sync {
    fn name(&self) -> &'static str;
    async fn lookup(&self, ip: Ipv4Addr) -> Result<RemoteAnswer, LookupError>;
}

/// One step of the resolution cascade
#[derive(Clone)]
pub enum LookupStrategy {
    /// Static backbone prefix table
    PrefixTable,
    /// Remote service, bounded by the resolver's remote timeout
    Remote(Arc<dyn RemoteLookup>),
}

impl LookupStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrefixTable => "prefix-table",
            Self::Remote(remote) => remote.name(),
        }
    }
}

/// Canonicalise an ASN field that may arrive as a number, a float, a string
/// with or without an "AS" prefix, or an object carrying an `asn` key.
pub fn normalize_asn(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Some(u.to_string());
            }
            let f = n.as_f64()?;
            if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
                Some((f as u64).to_string())
            } else {
                None
            }
        }
        Value::String(s) => normalize_asn_str(s),
        Value::Object(map) => map.get("asn").and_then(normalize_asn),
        _ => None,
    }
}

/// String form of [`normalize_asn`]: "AS4809", "as 4809", "4809.0" → "4809"
pub fn normalize_asn_str(s: &str) -> Option<String> {
    let s = s.trim();
    let s = match s.get(..2) {
        Some(head) if head.eq_ignore_ascii_case("as") => s[2..].trim_start(),
        _ => s,
    };
    let token = s.split_whitespace().next()?;
    let token = token.strip_suffix(".0").unwrap_or(token);
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        let n: u64 = token.parse().ok()?;
        Some(n.to_string())
    } else {
        None
    }
}

/// Combine whois and owner text into the string tier rules match against
fn whois_text(answer: &RemoteAnswer) -> Option<String> {
    let parts: Vec<String> = [answer.whois.as_deref(), answer.owner.as_deref()]
        .into_iter()
        .flatten()
        .map(sanitize_display)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Claim on an address's gate. The map entry goes away with the last claim,
/// also when a resolve future is dropped mid-lookup.
struct GateHandle<'a> {
    inflight: &'a Mutex<HashMap<Ipv4Addr, Gate>>,
    ip: Ipv4Addr,
    gate: Gate,
}

impl Drop for GateHandle<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock();
        // One reference in the map, one here: nobody else is waiting
        if let Some(entry) = inflight.get(&self.ip)
            && Arc::ptr_eq(entry, &self.gate)
            && Arc::strong_count(&self.gate) <= 2
        {
            inflight.remove(&self.ip);
        }
    }
}

/// Production resolver: private filter, then cache, then strategies in order
pub struct AsnResolver {
    cache: Arc<AsnCache>,
    strategies: Vec<LookupStrategy>,
    remote_timeout: Duration,
    /// Per-address gates so concurrent misses for one IP do a single lookup
    inflight: Mutex<HashMap<Ipv4Addr, Gate>>,
}

impl AsnResolver {
    pub fn new(cache: Arc<AsnCache>, strategies: Vec<LookupStrategy>, remote_timeout: Duration) -> Self {
        Self {
            cache,
            strategies,
            remote_timeout,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<AsnCache> {
        &self.cache
    }

    pub fn strategies(&self) -> &[LookupStrategy] {
        &self.strategies
    }

    fn gate(&self, ip: Ipv4Addr) -> GateHandle<'_> {
        let gate = self.inflight.lock().entry(ip).or_default().clone();
        GateHandle {
            inflight: &self.inflight,
            ip,
            gate,
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().len()
    }

    async fn run_strategies(&self, ip: Ipv4Addr) -> Result<CarrierRecord, LookupError> {
        let mut last_err: Option<LookupError> = None;

        for strategy in &self.strategies {
            let outcome = match strategy {
                LookupStrategy::PrefixTable => match rules::heuristic_asn(ip) {
                    Some((asn, net)) => Ok(rules::build_record(asn, Some(ip), Some(net.to_string()), None)),
                    None => continue,
                },
                LookupStrategy::Remote(remote) => {
                    match tokio::time::timeout(self.remote_timeout, remote.lookup(ip)).await {
                        Ok(Ok(answer)) if answer.asn.is_empty() => Err(LookupError::NoAsnFound(ip.to_string())),
                        Ok(Ok(mut answer)) => {
                            let whois = whois_text(&answer);
                            let routes = answer.router.remove(&answer.asn).unwrap_or_default();
                            Ok(rules::build_record(&answer.asn, Some(ip), answer.prefix, whois).with_routes(routes))
                        }
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(LookupError::Timeout(self.remote_timeout)),
                    }
                }
            };

            match outcome {
                Ok(record) => {
                    debug!(%ip, asn = %record.asn, via = strategy.name(), "resolved");
                    return Ok(record);
                }
                Err(e) => {
                    debug!(%ip, via = strategy.name(), error = %e, "lookup strategy failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| LookupError::NoAsnFound(ip.to_string())))
    }
}

#[async_trait]
impl Resolve for AsnResolver {
    async fn resolve(&self, ip: Ipv4Addr) -> Result<CarrierRecord, LookupError> {
        if is_private(ip) {
            return Err(LookupError::PrivateAddress);
        }

        let key = ip.to_string();
        if let Some(record) = self.cache.get(&key) {
            trace!(%ip, "cache hit");
            return Ok(record);
        }

        let handle = self.gate(ip);
        let _guard = handle.gate.lock().await;
        // Another task may have filled the cache while we waited
        if let Some(record) = self.cache.get(&key) {
            return Ok(record);
        }
        let resolved = self.run_strategies(ip).await;
        if let Ok(record) = &resolved {
            self.cache.insert(&key, record.clone());
        }
        resolved
    }
}
