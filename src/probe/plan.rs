//! Hop sources and the order they are tried in

use async_trait::async_trait;
use std::net::Ipv4Addr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::external::ExternalTracer;
use crate::error::ProbeError;
use crate::state::{HopAddress, filter_private, responding_count};
use crate::trace::engine::IcmpTracer;

/// Something that turns a destination into an ordered hop list.
///
/// Implementations must return hops in increasing TTL order with private
/// addresses already removed.
#[async_trait]
pub trait HopDiscovery: Send + Sync {
    async fn discover(
        &self,
        target: Ipv4Addr,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<HopAddress>, ProbeError>;
}

/// One way of discovering hops
#[derive(Debug, Clone)]
pub enum HopSource {
    Icmp(IcmpTracer),
    External(ExternalTracer),
}

impl HopSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Icmp(_) => "icmp",
            Self::External(_) => "external",
        }
    }

    async fn run(&self, target: Ipv4Addr, index: usize, cancel: &CancellationToken) -> Result<Vec<HopAddress>, ProbeError> {
        match self {
            Self::Icmp(tracer) => tracer.discover(target, index, cancel).await,
            Self::External(tracer) => tracer.discover(target, cancel).await,
        }
    }
}

/// Ordered list of sources; a later source runs only when an earlier one
/// fails with an error that allows fallback.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    sources: Vec<HopSource>,
}

impl ProbePlan {
    pub fn new(sources: Vec<HopSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[HopSource] {
        &self.sources
    }
}

#[async_trait]
impl HopDiscovery for ProbePlan {
    async fn discover(
        &self,
        target: Ipv4Addr,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<HopAddress>, ProbeError> {
        let mut last_err = ProbeError::NoHops;

        for (i, source) in self.sources.iter().enumerate() {
            let outcome = source.run(target, index, cancel).await.and_then(|hops| {
                let hops = filter_private(hops);
                if responding_count(&hops) == 0 {
                    Err(ProbeError::NoHops)
                } else {
                    Ok(hops)
                }
            });

            match outcome {
                Ok(hops) => {
                    debug!(%target, source = source.name(), hops = hops.len(), "hops discovered");
                    return Ok(hops);
                }
                Err(e) if e.allows_fallback() && i + 1 < self.sources.len() => {
                    warn!(%target, source = source.name(), error = %e, "hop source failed, falling back");
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }
}
