//! HTTP remote lookup against the RIPEstat network-info endpoint

use async_trait::async_trait;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::resolver::{RemoteAnswer, RemoteLookup, normalize_asn};
use crate::error::LookupError;

pub const DEFAULT_RIPE_URL: &str = "https://stat.ripe.net";

#[derive(Debug, Deserialize)]
struct NetworkInfoResponse {
    data: Option<NetworkInfo>,
}

#[derive(Debug, Deserialize)]
struct NetworkInfo {
    /// Entries may be bare numbers, strings, or objects with an `asn` key
    #[serde(default)]
    asns: Vec<serde_json::Value>,
    prefix: Option<String>,
}

/// `GET {base}/data/network-info/data.json?resource=<ip>`
pub struct RipeLookup {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RipeLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("backhaul/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Client-side timeouts surface as `Timeout`, like the resolver's own
    fn request_error(&self, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout(self.timeout)
        } else {
            e.into()
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/data/network-info/data.json", self.base_url)
    }
}

/// Interpret a network-info body
fn parse_network_info(ip: Ipv4Addr, body: NetworkInfoResponse) -> Result<RemoteAnswer, LookupError> {
    let info = body
        .data
        .ok_or_else(|| LookupError::Malformed("missing data object".into()))?;
    let first = info
        .asns
        .first()
        .ok_or_else(|| LookupError::NoAsnFound(ip.to_string()))?;
    let asn = normalize_asn(first)
        .ok_or_else(|| LookupError::Malformed(format!("unrecognised ASN value {}", first)))?;

    Ok(RemoteAnswer {
        asn,
        prefix: info.prefix.filter(|p| !p.is_empty()),
        ..RemoteAnswer::default()
    })
}

#[async_trait]
impl RemoteLookup for RipeLookup {
    fn name(&self) -> &'static str {
        "ripe"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<RemoteAnswer, LookupError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("resource", ip.to_string())])
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Transport(format!("HTTP {}", status)));
        }

        let body: NetworkInfoResponse = response.json().await.map_err(|e| match self.request_error(e) {
            LookupError::Transport(msg) => LookupError::Malformed(msg),
            other => other,
        })?;
        parse_network_info(ip, body)
    }
}
