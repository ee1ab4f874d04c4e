use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

use super::convergence::convergence_boundary;
use crate::lookup::Resolve;
use crate::lookup::rules;
use crate::state::{CarrierRecord, HopAddress, RouteSegment};

/// Classification of one destination's hop list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSummary {
    /// Descending priority, ties by ascending ASN
    pub segments: Vec<RouteSegment>,
    /// TTL of the hop where a convergence layer was detected
    pub convergence_ttl: Option<u8>,
    /// Hops that resolved to a carrier
    pub resolved: usize,
    /// The route crosses more than one operator family, which makes the
    /// segment grading less reliable
    pub multi_carrier: bool,
}

/// Turns hop lists into ordered, deduplicated carrier segments
#[derive(Clone)]
pub struct RouteClassifier {
    resolver: Arc<dyn Resolve>,
}

impl RouteClassifier {
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self { resolver }
    }

    /// Resolve every responding hop and summarise the route.
    ///
    /// Lookups run concurrently, results are consumed in TTL order. Hops that
    /// fail to resolve are skipped.
    pub async fn analyze(&self, hops: &[HopAddress]) -> RouteSummary {
        let mut ordered: Vec<&HopAddress> = hops.iter().filter(|h| !h.is_silent()).collect();
        ordered.sort_by_key(|h| h.ttl);

        let lookups = ordered.iter().filter_map(|hop| {
            let ip = hop.addr?;
            let resolver = self.resolver.clone();
            Some(async move { (hop.ttl, ip, resolver.resolve(ip).await) })
        });

        let mut resolved = Vec::with_capacity(ordered.len());
        for (ttl, ip, outcome) in futures::future::join_all(lookups).await {
            match outcome {
                Ok(record) => resolved.push((ttl, record)),
                Err(e) if e.is_filter_signal() => trace!(%ip, ttl, "skipping private hop"),
                Err(e) => debug!(%ip, ttl, error = %e, "hop unresolved"),
            }
        }

        summarize(resolved)
    }

    /// Segments only
    pub async fn classify(&self, hops: &[HopAddress]) -> Vec<RouteSegment> {
        self.analyze(hops).await.segments
    }
}

/// Truncate at the convergence boundary, dedup by ASN (first occurrence
/// wins) and order by priority.
///
/// Route-wide facts (ChinaNet presence, operator families) are taken from
/// every resolved hop, before truncation.
pub fn summarize(resolved: Vec<(u8, CarrierRecord)>) -> RouteSummary {
    let count = resolved.len();
    let has_chinanet = resolved.iter().any(|(_, r)| r.asn == rules::CHINANET_ASN);
    let families: HashSet<_> = resolved.iter().filter_map(|(_, r)| r.family).collect();

    let asns: Vec<&str> = resolved.iter().map(|(_, r)| r.asn.as_str()).collect();
    let boundary = convergence_boundary(&asns);
    let convergence_ttl = boundary.map(|i| resolved[i].0);
    let keep = boundary.unwrap_or(count);

    let mut seen = HashSet::new();
    let mut segments: Vec<RouteSegment> = resolved
        .into_iter()
        .take(keep)
        .filter(|(_, record)| seen.insert(record.asn.clone()))
        .map(|(_, record)| {
            let record = rules::apply_route_context(record, has_chinanet);
            RouteSegment {
                tier: record.tier,
                priority: rules::priority(&record.asn),
                carrier: record,
            }
        })
        .collect();

    segments.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.carrier.asn_number().cmp(&b.carrier.asn_number()))
    });

    RouteSummary {
        segments,
        convergence_ttl,
        resolved: count,
        multi_carrier: families.len() > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::rules::build_record;
    use crate::state::Tier;
    use proptest::prelude::*;

    fn rec(asn: &str) -> CarrierRecord {
        build_record(asn, None, None, None)
    }

    fn path(asns: &[&str]) -> Vec<(u8, CarrierRecord)> {
        asns.iter().enumerate().map(|(i, a)| (i as u8 + 1, rec(a))).collect()
    }

    fn order(summary: &RouteSummary) -> Vec<&str> {
        summary.segments.iter().map(|s| s.carrier.asn.as_str()).collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(summarize(Vec::new()), RouteSummary::default());
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let mut hops = path(&["4134", "4134", "4809", "4134"]);
        hops[0].1.prefix = Some("first".into());
        let summary = summarize(hops);
        assert_eq!(order(&summary), vec!["4809", "4134"]);
        assert_eq!(summary.segments[1].carrier.prefix.as_deref(), Some("first"));
        assert_eq!(summary.convergence_ttl, None);
    }

    #[test]
    fn test_convergence_truncates() {
        let summary = summarize(path(&["4134", "4809", "4809", "4809", "23764"]));
        assert_eq!(order(&summary), vec!["4809", "4134"]);
        assert_eq!(summary.convergence_ttl, Some(3));
        assert_eq!(summary.resolved, 5);
    }

    #[test]
    fn test_priority_then_asn() {
        let summary = summarize(path(&["64512", "4837", "23764", "4134", "13335"]));
        assert_eq!(order(&summary), vec!["23764", "4134", "4837", "13335", "64512"]);
    }

    #[test]
    fn test_multi_carrier_flag() {
        assert!(!summarize(path(&["4134", "4809", "23764"])).multi_carrier);
        assert!(summarize(path(&["4134", "9929"])).multi_carrier);
        // CERNET and unknown networks belong to no family
        assert!(!summarize(path(&["4538", "13335", "4837"])).multi_carrier);
    }

    #[test]
    fn test_chinanet_in_route_marks_cn2_gt() {
        let mut hops = path(&["4134", "4809"]);
        hops[1].1 = build_record("4809", None, None, Some("CN2-GIA".into()));
        let summary = summarize(hops);
        let cn2 = summary.segments.iter().find(|s| s.carrier.asn == "4809").unwrap();
        assert_eq!(cn2.tier, Tier::Quality);
        assert_eq!(cn2.display_text(), "CN2 GT [Quality]");

        let alone = summarize(vec![(1, build_record("4809", None, None, Some("CN2-GIA".into())))]);
        assert_eq!(alone.segments[0].tier, Tier::Premium);
    }

    #[test]
    fn test_gia_block_kept_next_to_chinanet() {
        let mut hops = path(&["4134", "4809"]);
        hops[1].1 = build_record(
            "4809",
            Some("59.43.80.3".parse().unwrap()),
            Some("59.43.80.0/24".into()),
            None,
        );
        let summary = summarize(hops);
        assert_eq!(summary.segments[0].display_text(), "CN2 GIA [Premium]");
    }

    proptest! {
        #[test]
        fn prop_summary_is_stable(asns in prop::collection::vec(
            prop::sample::select(vec!["4134", "4809", "9929", "23764", "58453", "64512"]),
            0..12,
        )) {
            let first = summarize(path(&asns));
            let second = summarize(path(&asns));
            prop_assert_eq!(&first, &second);

            let mut seen = HashSet::new();
            prop_assert!(first.segments.iter().all(|s| seen.insert(s.carrier.asn.clone())));
            prop_assert!(first.segments.windows(2).all(|w| w[0].priority >= w[1].priority));
        }
    }
}
