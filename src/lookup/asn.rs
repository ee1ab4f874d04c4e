//! Team Cymru DNS remote lookup

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver, TokioResolver};
use std::net::Ipv4Addr;
use tracing::warn;

use super::resolver::{RemoteAnswer, RemoteLookup, normalize_asn_str};
use super::sanitize_display;
use crate::error::LookupError;

/// ASN lookup via TXT records under origin.asn.cymru.com
pub struct CymruLookup {
    resolver: TokioResolver,
}

impl CymruLookup {
    pub fn new() -> Self {
        // Try system DNS config first, fall back to Google DNS if unavailable
        let resolver = match Resolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "system DNS config unavailable, using Google DNS");
                Resolver::builder_with_config(ResolverConfig::google(), TokioConnectionProvider::default()).build()
            }
        };
        Self { resolver }
    }

    /// Fetch one TXT record and flatten its character strings
    async fn txt(&self, name: &str) -> Result<String, LookupError> {
        let records = self
            .resolver
            .txt_lookup(name)
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        let record = records
            .iter()
            .next()
            .ok_or_else(|| LookupError::NoAsnFound(name.to_string()))?;

        // TXT records may be quoted or split into multiple strings
        let joined: String = record
            .txt_data()
            .iter()
            .filter_map(|bytes| std::str::from_utf8(bytes).ok())
            .collect::<Vec<_>>()
            .join("");
        Ok(joined.trim_matches('"').to_string())
    }
}

impl Default for CymruLookup {
    fn default() -> Self {
        Self::new()
    }
}

/// 8.8.4.1 → "1.4.8.8.origin.asn.cymru.com"
pub fn origin_query(ip: Ipv4Addr) -> String {
    let o = ip.octets();
    format!("{}.{}.{}.{}.origin.asn.cymru.com", o[3], o[2], o[1], o[0])
}

/// Parse "AS | IP | BGP Prefix | CC | Registry | Allocated".
///
/// Multi-origin prefixes list several ASNs separated by spaces; the first one
/// is taken.
pub fn parse_origin(txt: &str) -> Result<(String, Option<String>), LookupError> {
    let parts: Vec<&str> = txt.split('|').map(str::trim).collect();
    let asn = parts
        .first()
        .and_then(|field| normalize_asn_str(field))
        .ok_or_else(|| LookupError::Malformed(format!("bad origin record: {}", txt)))?;
    let prefix = parts.get(2).filter(|p| !p.is_empty()).map(|p| p.to_string());
    Ok((asn, prefix))
}

/// Parse "AS | CC | Registry | Allocated | AS Name"
pub fn parse_as_name(txt: &str) -> Option<String> {
    txt.split('|')
        .map(str::trim)
        .nth(4)
        .filter(|name| !name.is_empty())
        .map(sanitize_display)
}

#[async_trait]
impl RemoteLookup for CymruLookup {
    fn name(&self) -> &'static str {
        "cymru"
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<RemoteAnswer, LookupError> {
        let origin = self.txt(&origin_query(ip)).await?;
        let (asn, prefix) = parse_origin(&origin)?;

        // Name is enrichment only
        let owner = match self.txt(&format!("AS{}.asn.cymru.com", asn)).await {
            Ok(txt) => parse_as_name(&txt),
            Err(_) => None,
        };

        Ok(RemoteAnswer {
            asn,
            prefix,
            owner,
            ..RemoteAnswer::default()
        })
    }
}
