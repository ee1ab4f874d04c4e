//! Static knowledge about the backbones this tool is built around.
//!
//! Three tables live here:
//! - prefix → ASN heuristics, consulted before any remote lookup
//! - tier rules, evaluated in order by a single matcher (first match wins)
//! - the carrier catalog with display names, priority ranks and operator family

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use crate::state::{CarrierFamily, CarrierRecord, Tier};

/// Known backbone ranges, matched longest-prefix-first
const PREFIX_ASNS: &[(&str, &str)] = &[
    // CTGNet
    ("69.194.0.0/16", "23764"),
    ("203.22.0.0/16", "23764"),
    ("103.135.224.0/22", "23764"),
    // CN2 GIA / GT
    ("59.43.80.0/24", "4809"),
    ("59.43.244.0/22", "4809"),
    ("59.43.248.0/23", "4809"),
    // Unicom 9929
    ("218.105.0.0/16", "9929"),
    ("210.51.0.0/16", "9929"),
    ("113.200.0.0/16", "9929"),
    ("112.64.0.0/16", "9929"),
    // Unicom CUG
    ("219.158.113.0/24", "10099"),
    ("219.158.114.0/24", "10099"),
    ("219.158.115.0/24", "10099"),
    // Mobile CMIN2
    ("223.120.16.0/23", "58807"),
    ("223.120.19.0/24", "58807"),
    ("223.120.6.0/23", "58807"),
    ("223.120.130.0/23", "58807"),
    ("223.120.140.0/23", "58807"),
    // ChinaNet 163
    ("202.97.0.0/16", "4134"),
    ("202.96.0.0/16", "4134"),
    ("61.139.0.0/16", "4134"),
    ("58.60.0.0/16", "4134"),
    ("219.141.0.0/16", "4134"),
    ("219.140.0.0/16", "4134"),
    ("180.149.0.0/16", "4134"),
    ("180.153.0.0/16", "4134"),
    ("61.182.0.0/16", "4134"),
    ("61.183.0.0/16", "4134"),
    // Unicom 4837
    ("219.158.0.0/16", "4837"),
    ("210.22.0.0/16", "4837"),
    ("210.21.0.0/16", "4837"),
    ("202.106.0.0/16", "4837"),
    ("119.6.0.0/16", "4837"),
    ("119.7.0.0/16", "4837"),
    ("125.33.0.0/16", "4837"),
    ("125.34.0.0/16", "4837"),
    // Mobile CMI
    ("223.118.0.0/15", "58453"),
    ("223.120.0.0/15", "58453"),
    ("223.122.0.0/15", "58453"),
    // Mobile domestic
    ("211.136.0.0/16", "9808"),
    ("221.179.0.0/16", "9808"),
    ("120.196.0.0/16", "9808"),
    ("211.137.0.0/16", "9808"),
    ("111.24.0.0/15", "9808"),
];

/// What a tier rule looks at
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    Asn(&'static str),
    Prefix(&'static str),
    AsnPrefix(&'static str, &'static str),
    /// Substring of the (upper-cased) whois/organisation text
    Whois(&'static str),
    AsnWhois(&'static str, &'static str),
}

/// One row of the tier table
#[derive(Debug, Clone, Copy)]
pub struct TierRule {
    pub matcher: Matcher,
    pub tier: Tier,
    /// Display name override, for ASNs that carry more than one grade of service
    pub label: Option<&'static str>,
}

const fn rule(matcher: Matcher, tier: Tier, label: Option<&'static str>) -> TierRule {
    TierRule {
        matcher,
        tier,
        label,
    }
}

use Matcher::{Asn, AsnPrefix, AsnWhois, Prefix, Whois};
use Tier::{Premium, Quality, Regular};

/// Ordered tier rules. Prefix rules for an ASN come before its whois rule so
/// the address decides GIA vs GT when it can.
pub const TIER_RULES: &[TierRule] = &[
    rule(Asn("23764"), Premium, Some("CTGNet")),
    rule(Asn("58807"), Premium, Some("CMIN2")),
    rule(AsnPrefix("4809", "59.43.80.0/24"), Premium, Some("CN2 GIA")),
    rule(AsnPrefix("4809", "59.43.244.0/22"), Quality, Some("CN2 GT")),
    rule(AsnPrefix("4809", "59.43.248.0/23"), Quality, Some("CN2 GT")),
    rule(AsnWhois("4809", "GIA"), Premium, Some("CN2 GIA")),
    rule(Asn("4809"), Quality, Some("CN2 GT")),
    rule(Prefix("69.194.0.0/16"), Premium, Some("CTGNet")),
    rule(Prefix("203.22.0.0/16"), Premium, Some("CTGNet")),
    rule(Whois("CTG-CN"), Premium, Some("CTGNet")),
    rule(Whois("CTGNET"), Premium, Some("CTGNet")),
    rule(Whois("CMIN2-NET"), Premium, Some("CMIN2")),
    rule(Asn("10099"), Quality, None),
    rule(Asn("9929"), Quality, None),
    rule(Asn("9808"), Quality, None),
    rule(Prefix("218.105.0.0/16"), Quality, Some("CU 9929")),
    rule(Prefix("210.51.0.0/16"), Quality, Some("CU 9929")),
    rule(Prefix("219.158.113.0/24"), Quality, Some("CUG")),
    rule(Whois("CNC-BACKBONE"), Quality, Some("CU 9929")),
    rule(Whois("CUG-BACKBONE"), Quality, Some("CUG")),
    rule(Asn("4134"), Regular, None),
    rule(Asn("4837"), Regular, None),
    rule(Asn("58453"), Regular, None),
    rule(Asn("4538"), Regular, None),
    rule(Prefix("202.97.0.0/16"), Regular, None),
    rule(Prefix("219.158.0.0/16"), Regular, None),
    rule(Prefix("211.136.0.0/16"), Regular, None),
    rule(Prefix("221.179.0.0/16"), Regular, None),
];

/// Catalog entry for a known carrier ASN
#[derive(Debug, Clone, Copy)]
pub struct CarrierInfo {
    pub asn: &'static str,
    pub name: &'static str,
    pub priority: i32,
    /// None for networks outside the three operator groups
    pub family: Option<CarrierFamily>,
}

use CarrierFamily::{Mobile, Telecom, Unicom};

const fn info(asn: &'static str, name: &'static str, priority: i32, family: Option<CarrierFamily>) -> CarrierInfo {
    CarrierInfo {
        asn,
        name,
        priority,
        family,
    }
}

pub const CARRIERS: &[CarrierInfo] = &[
    info("23764", "CTGNet", 100, Some(Telecom)),
    info("4809", "CN2", 90, Some(Telecom)),
    info("58807", "CMIN2", 85, Some(Mobile)),
    info("9929", "CU 9929", 80, Some(Unicom)),
    info("10099", "CUG", 75, Some(Unicom)),
    info("9808", "CMI", 60, Some(Mobile)),
    info("4134", "ChinaNet 163", 40, Some(Telecom)),
    info("4837", "CU 4837", 40, Some(Unicom)),
    info("58453", "CMI", 30, Some(Mobile)),
    info("4538", "CERNET", 20, None),
];

/// ChinaNet 163; its presence marks a CN2 path as GT
pub const CHINANET_ASN: &str = "4134";
const CN2_ASN: &str = "4809";
/// Addresses here are GIA whatever else the route carries
const CN2_GIA_ANCHOR: &str = "59.43.80.0/24";

/// What the matcher evaluates a rule against
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub asn: &'a str,
    pub ip: Option<Ipv4Addr>,
    pub whois: Option<&'a str>,
}

fn network(cidr: &str) -> Option<Ipv4Network> {
    cidr.parse().ok()
}

fn in_prefix(ip: Option<Ipv4Addr>, cidr: &str) -> bool {
    match (ip, network(cidr)) {
        (Some(ip), Some(net)) => net.contains(ip),
        _ => false,
    }
}

fn whois_contains(whois: Option<&str>, needle: &str) -> bool {
    whois.is_some_and(|w| w.to_uppercase().contains(needle))
}

impl Matcher {
    pub fn matches(&self, subject: &Subject<'_>) -> bool {
        match *self {
            Asn(asn) => subject.asn == asn,
            Prefix(cidr) => in_prefix(subject.ip, cidr),
            AsnPrefix(asn, cidr) => subject.asn == asn && in_prefix(subject.ip, cidr),
            Whois(needle) => whois_contains(subject.whois, needle),
            AsnWhois(asn, needle) => subject.asn == asn && whois_contains(subject.whois, needle),
        }
    }
}

/// Evaluate `rules` in order and return the first hit
pub fn first_match<'r>(rules: &'r [TierRule], subject: &Subject<'_>) -> Option<&'r TierRule> {
    rules.iter().find(|rule| rule.matcher.matches(subject))
}

static PREFIX_TABLE: LazyLock<Vec<(Ipv4Network, &'static str)>> = LazyLock::new(|| {
    let mut table: Vec<(Ipv4Network, &'static str)> = PREFIX_ASNS
        .iter()
        .filter_map(|(cidr, asn)| network(cidr).map(|net| (net, *asn)))
        .collect();
    // Longest prefix first so sub-ranges win over their parent block
    table.sort_by(|a, b| b.0.prefix().cmp(&a.0.prefix()));
    table
});

/// Zero-latency ASN guess from the static prefix table
pub fn heuristic_asn(ip: Ipv4Addr) -> Option<(&'static str, Ipv4Network)> {
    PREFIX_TABLE
        .iter()
        .find(|(net, _)| net.contains(ip))
        .map(|(net, asn)| (*asn, *net))
}

pub fn carrier(asn: &str) -> Option<&'static CarrierInfo> {
    CARRIERS.iter().find(|c| c.asn == asn)
}

pub fn family(asn: &str) -> Option<CarrierFamily> {
    carrier(asn).and_then(|c| c.family)
}

/// Fixed rank used to order segments; unknown ASNs rank 0
pub fn priority(asn: &str) -> i32 {
    carrier(asn).map(|c| c.priority).unwrap_or(0)
}

/// Tier and display name for an ASN seen at `ip`
pub fn classify(asn: &str, ip: Option<Ipv4Addr>, whois: Option<&str>) -> (Tier, String) {
    let subject = Subject { asn, ip, whois };
    let hit = first_match(TIER_RULES, &subject);
    let tier = hit.map(|r| r.tier).unwrap_or(Tier::Unknown);
    let name = hit
        .and_then(|r| r.label)
        .or_else(|| carrier(asn).map(|c| c.name))
        .map(str::to_string)
        .unwrap_or_else(|| format!("AS{}", asn));
    (tier, name)
}

/// Build the carrier record for an ASN resolved for `ip`
pub fn build_record(
    asn: &str,
    ip: Option<Ipv4Addr>,
    prefix: Option<String>,
    whois: Option<String>,
) -> CarrierRecord {
    let (tier, name) = classify(asn, ip, whois.as_deref());
    CarrierRecord {
        asn: asn.to_string(),
        name,
        description: tier.to_string(),
        tier,
        prefix,
        whois,
        family: family(asn),
        routes: Vec::new(),
    }
}

/// Whether a CN2 GIA record rests on the GIA address block rather than on
/// whois text
fn gia_anchored(record: &CarrierRecord) -> bool {
    let (Some(anchor), Some(prefix)) = (
        network(CN2_GIA_ANCHOR),
        record.prefix.as_deref().and_then(|p| p.parse::<Ipv4Network>().ok()),
    ) else {
        return false;
    };
    prefix.prefix() >= anchor.prefix() && anchor.contains(prefix.network())
}

/// Re-grade a record once the whole route is known.
///
/// A whois-derived CN2 GIA becomes CN2 GT when ChinaNet 163 shows up in the
/// route or in the record's own upstream paths. Records inside the GIA
/// address block are left alone.
pub fn apply_route_context(record: CarrierRecord, route_has_chinanet: bool) -> CarrierRecord {
    if record.asn != CN2_ASN || record.tier != Tier::Premium || gia_anchored(&record) {
        return record;
    }
    let upstream_chinanet = record.routes.iter().any(|r| r.contains(CHINANET_ASN));
    if !(route_has_chinanet || upstream_chinanet) {
        return record;
    }
    let Some(gt) = first_match(TIER_RULES, &Subject {
        asn: CN2_ASN,
        ip: None,
        whois: None,
    }) else {
        return record;
    };
    CarrierRecord {
        name: gt.label.unwrap_or("CN2 GT").to_string(),
        description: gt.tier.to_string(),
        tier: gt.tier,
        ..record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_heuristic_longest_prefix() {
        assert_eq!(heuristic_asn(ip("219.158.113.9")).map(|h| h.0), Some("10099"));
        assert_eq!(heuristic_asn(ip("219.158.1.1")).map(|h| h.0), Some("4837"));
        assert_eq!(heuristic_asn(ip("223.120.19.1")).map(|h| h.0), Some("58807"));
        assert_eq!(heuristic_asn(ip("223.120.99.1")).map(|h| h.0), Some("58453"));
        assert_eq!(heuristic_asn(ip("59.43.80.1")).map(|h| h.0), Some("4809"));
        assert_eq!(heuristic_asn(ip("8.8.8.8")), None);
    }

    #[test]
    fn test_heuristic_reports_matched_prefix() {
        let (asn, net) = heuristic_asn(ip("103.135.226.4")).unwrap();
        assert_eq!(asn, "23764");
        assert_eq!(net.to_string(), "103.135.224.0/22");
    }

    #[test]
    fn test_cn2_split_by_prefix() {
        let (tier, name) = classify("4809", Some(ip("59.43.80.12")), None);
        assert_eq!(tier, Tier::Premium);
        assert_eq!(name, "CN2 GIA");

        let (tier, name) = classify("4809", Some(ip("59.43.246.1")), None);
        assert_eq!(tier, Tier::Quality);
        assert_eq!(name, "CN2 GT");
    }

    #[test]
    fn test_cn2_whois_is_secondary() {
        // Unknown 59.43 sub-range, whois says GIA
        let (tier, name) = classify("4809", Some(ip("59.43.1.1")), Some("CN2-GIA backbone"));
        assert_eq!(tier, Tier::Premium);
        assert_eq!(name, "CN2 GIA");

        // Known GT range wins over the whois hint
        let (tier, _) = classify("4809", Some(ip("59.43.244.1")), Some("CN2-GIA"));
        assert_eq!(tier, Tier::Quality);
    }

    #[test]
    fn test_whois_rules() {
        let (tier, name) = classify("64512", Some(ip("8.8.8.8")), Some("ctg-cn transit"));
        assert_eq!(tier, Tier::Premium);
        assert_eq!(name, "CTGNet");

        let (tier, _) = classify("64512", None, Some("CUG-BACKBONE"));
        assert_eq!(tier, Tier::Quality);
    }

    #[test]
    fn test_regular_and_unknown() {
        assert_eq!(classify("4134", None, None), (Tier::Regular, "ChinaNet 163".to_string()));
        assert_eq!(classify("4837", None, None).0, Tier::Regular);
        assert_eq!(classify("13335", None, None), (Tier::Unknown, "AS13335".to_string()));
    }

    #[test]
    fn test_priorities() {
        assert!(priority("23764") > priority("4809"));
        assert!(priority("4809") > priority("4134"));
        assert_eq!(priority("4134"), priority("4837"));
        assert_eq!(priority("13335"), 0);
    }

    #[test]
    fn test_every_rule_prefix_parses() {
        for rule in TIER_RULES {
            if let Prefix(cidr) | AsnPrefix(_, cidr) = rule.matcher {
                assert!(network(cidr).is_some(), "bad cidr {}", cidr);
            }
        }
        assert_eq!(PREFIX_TABLE.len(), PREFIX_ASNS.len());
    }

    #[test]
    fn test_families() {
        assert_eq!(family("4809"), Some(CarrierFamily::Telecom));
        assert_eq!(family("10099"), Some(CarrierFamily::Unicom));
        assert_eq!(family("58807"), Some(CarrierFamily::Mobile));
        assert_eq!(family("4538"), None);
        assert_eq!(family("13335"), None);
        assert_eq!(build_record("9808", None, None, None).family, Some(CarrierFamily::Mobile));
    }

    #[test]
    fn test_chinanet_downgrades_whois_gia() {
        let gia = build_record("4809", Some(ip("59.43.1.1")), None, Some("CN2-GIA".into()));
        assert_eq!(gia.tier, Tier::Premium);

        let untouched = apply_route_context(gia.clone(), false);
        assert_eq!(untouched, gia);

        let gt = apply_route_context(gia.clone(), true);
        assert_eq!(gt.tier, Tier::Quality);
        assert_eq!(gt.name, "CN2 GT");
        assert_eq!(gt.description, "[Quality]");

        let via_upstream = apply_route_context(gia.with_routes(vec!["4809 4134 4134".into()]), false);
        assert_eq!(via_upstream.tier, Tier::Quality);
    }

    #[test]
    fn test_gia_block_survives_chinanet() {
        let gia = build_record("4809", Some(ip("59.43.80.7")), Some("59.43.80.0/24".into()), None);
        assert_eq!(apply_route_context(gia.clone(), true), gia);

        // Other carriers are never re-graded
        let ctg = build_record("23764", None, None, None);
        assert_eq!(apply_route_context(ctg.clone(), true), ctg);
    }

    #[test]
    fn test_build_record() {
        let record = build_record("23764", Some(ip("69.194.1.1")), Some("69.194.0.0/16".into()), None);
        assert_eq!(record.asn, "23764");
        assert_eq!(record.name, "CTGNet");
        assert_eq!(record.tier, Tier::Premium);
        assert_eq!(record.description, "[Premium]");
    }
}
