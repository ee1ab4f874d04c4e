use std::io::Write;

use super::BatchReport;
use crate::state::{ProbeResult, ProbeStatus};

/// Route column for one result
pub fn route_text(result: &ProbeResult) -> String {
    match &result.status {
        ProbeStatus::Success if result.segments.is_empty() => "no known route detected".to_string(),
        ProbeStatus::Success => result
            .segments
            .iter()
            .map(|s| s.display_text())
            .collect::<Vec<_>>()
            .join("  "),
        ProbeStatus::PartialTimeout { phase } => format!("timed out while {}", phase.label()),
        ProbeStatus::Failed { reason } => format!("failed: {}", reason),
    }
}

/// One line per destination, in configuration order
pub fn generate_report<W: Write>(report: &BatchReport, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "backhaul report ({} destinations)", report.results.len())?;
    writeln!(writer, "Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer)?;

    for result in &report.results {
        let address = result
            .address
            .map(|a| a.to_string())
            .unwrap_or_else(|| result.host.clone());
        writeln!(writer, "{:<18} {:<16} {}", result.label, address, route_text(result))?;
        if result.multi_carrier {
            writeln!(writer, "{:<18} {:<16} warning: route crosses several operators, grading may be inaccurate", "", "")?;
        }
    }

    Ok(())
}

/// Generate report to string
pub fn generate_report_string(report: &BatchReport) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = generate_report(report, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::rules::build_record;
    use crate::state::{Phase, RouteSegment};
    use std::net::Ipv4Addr;

    fn success(segments: Vec<RouteSegment>) -> ProbeResult {
        let mut r = ProbeResult::failed(0, "Beijing Telecom", "219.141.140.10", "");
        r.status = ProbeStatus::Success;
        r.address = Some(Ipv4Addr::new(219, 141, 140, 10));
        r.segments = segments;
        r
    }

    #[test]
    fn test_route_text_variants() {
        let record = build_record("4809", Some(Ipv4Addr::new(59, 43, 80, 1)), None, None);
        let seg = RouteSegment {
            tier: record.tier,
            priority: 90,
            carrier: record,
        };
        assert_eq!(route_text(&success(vec![seg])), "CN2 GIA [Premium]");
        assert_eq!(route_text(&success(Vec::new())), "no known route detected");

        let mut timed_out = success(Vec::new());
        timed_out.status = ProbeStatus::PartialTimeout { phase: Phase::Probing };
        assert_eq!(route_text(&timed_out), "timed out while probing");

        let failed = ProbeResult::failed(1, "x", "y", "no hops discovered");
        assert_eq!(route_text(&failed), "failed: no hops discovered");
    }

    #[test]
    fn test_report_has_line_per_result() {
        let mut second = ProbeResult::failed(1, "Beijing Unicom", "202.106.195.68", "socket error: EPERM");
        second.index = 1;
        let report = BatchReport::new(chrono::Utc::now(), vec![success(Vec::new()), second]);
        let text = generate_report_string(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].starts_with("Beijing Telecom"));
        assert!(lines[3].contains("219.141.140.10"));
        assert!(lines[4].contains("failed: socket error"));
    }

    #[test]
    fn test_multi_carrier_warning_line() {
        let mut mixed = success(Vec::new());
        mixed.multi_carrier = true;
        let report = BatchReport::new(chrono::Utc::now(), vec![mixed, success(Vec::new())]);
        let text = generate_report_string(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[4].contains("warning: route crosses several operators"));
        assert!(lines[5].starts_with("Beijing Telecom"));
    }
}
