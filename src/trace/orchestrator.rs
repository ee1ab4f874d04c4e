//! Batch fan-out over the configured destinations.
//!
//! Each destination gets its own task. The collector waits on all of them
//! under one wall-clock deadline and writes each result into the slot for its
//! index. Workers still running at the deadline are told to stop through the
//! cancellation token but are never aborted; their late results are dropped.

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::any::Any;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::probe::HopDiscovery;
use crate::route::RouteClassifier;
use crate::state::{Phase, ProbeResult, ProbeStatus};
use crate::targets::Destination;

/// What the collector knows about a worker that has not reported yet
#[derive(Debug, Default, Clone)]
struct Progress {
    phase: Phase,
    address: Option<Ipv4Addr>,
    hop_count: usize,
}

type SharedProgress = Arc<Mutex<Progress>>;

/// Runs one bounded batch of probes
#[derive(Clone)]
pub struct Orchestrator {
    discovery: Arc<dyn HopDiscovery>,
    classifier: RouteClassifier,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(discovery: Arc<dyn HopDiscovery>, classifier: RouteClassifier, deadline: Duration) -> Self {
        Self {
            discovery,
            classifier,
            deadline,
        }
    }

    /// Probe every destination. The returned vector has exactly one result
    /// per destination, in configuration order.
    pub async fn run(&self, destinations: &[Destination], cancel: &CancellationToken) -> Vec<ProbeResult> {
        let batch = cancel.child_token();
        let progress: Vec<SharedProgress> = destinations.iter().map(|_| SharedProgress::default()).collect();

        let mut workers = FuturesUnordered::new();
        for (index, dest) in destinations.iter().enumerate() {
            let handle = tokio::spawn(probe_one(
                index,
                dest.clone(),
                self.discovery.clone(),
                self.classifier.clone(),
                progress[index].clone(),
                batch.clone(),
            ));
            workers.push(async move { (index, handle.await) });
        }

        let mut slots: Vec<Option<ProbeResult>> = vec![None; destinations.len()];
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                finished = workers.next() => {
                    let Some((index, joined)) = finished else {
                        break;
                    };
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) => {
                            let reason = if e.is_panic() {
                                format!("worker panicked: {}", panic_message(e.into_panic()))
                            } else {
                                "worker cancelled".to_string()
                            };
                            warn!(index, %reason, "probe worker failed");
                            let dest = &destinations[index];
                            ProbeResult::failed(index, &dest.label, &dest.host, reason)
                        }
                    };
                    if slots[index].is_none() {
                        slots[index] = Some(result);
                    }
                }
                _ = &mut deadline => {
                    debug!(pending = workers.len(), "batch deadline reached");
                    break;
                }
            }
        }

        // Stop stragglers cooperatively; their handles are detached on drop
        batch.cancel();

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| timed_out(index, &destinations[index], &progress[index])))
            .collect()
    }
}

fn timed_out(index: usize, dest: &Destination, progress: &SharedProgress) -> ProbeResult {
    let snapshot = progress.lock().clone();
    ProbeResult {
        index,
        label: dest.label.clone(),
        host: dest.host.clone(),
        address: snapshot.address,
        segments: Vec::new(),
        hop_count: snapshot.hop_count,
        convergence_ttl: None,
        multi_carrier: false,
        status: ProbeStatus::PartialTimeout { phase: snapshot.phase },
    }
}

/// Extract a readable message from a panic payload
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolve a configured host to IPv4
pub async fn resolve_host(host: &str) -> Result<Ipv4Addr, String> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| format!("cannot resolve {}: {}", host, e))?;
    addrs
        .filter_map(|sa| match sa.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| format!("{} has no IPv4 address", host))
}

/// Full pipeline for one destination
async fn probe_one(
    index: usize,
    dest: Destination,
    discovery: Arc<dyn HopDiscovery>,
    classifier: RouteClassifier,
    progress: SharedProgress,
    cancel: CancellationToken,
) -> ProbeResult {
    progress.lock().phase = Phase::Probing;

    let address = match resolve_host(&dest.host).await {
        Ok(address) => address,
        Err(reason) => return ProbeResult::failed(index, &dest.label, &dest.host, reason),
    };
    progress.lock().address = Some(address);

    let hops = match discovery.discover(address, index, &cancel).await {
        Ok(hops) => hops,
        Err(e) => {
            let mut result = ProbeResult::failed(index, &dest.label, &dest.host, e.to_string());
            result.address = Some(address);
            return result;
        }
    };

    {
        let mut p = progress.lock();
        p.phase = Phase::Classifying;
        p.hop_count = hops.len();
    }

    let summary = classifier.analyze(&hops).await;
    progress.lock().phase = Phase::Done;
    debug!(index, label = %dest.label, segments = summary.segments.len(), "destination classified");

    ProbeResult {
        index,
        label: dest.label,
        host: dest.host,
        address: Some(address),
        segments: summary.segments,
        hop_count: hops.len(),
        convergence_ttl: summary.convergence_ttl,
        multi_carrier: summary.multi_carrier,
        status: ProbeStatus::Success,
    }
}
