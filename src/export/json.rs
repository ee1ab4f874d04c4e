use std::io::Write;

use super::BatchReport;

/// Export the batch as pretty JSON
pub fn export_json<W: Write>(report: &BatchReport, writer: W) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ProbeResult, ProbeStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_export_shape() {
        let started = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let mut ok = ProbeResult::failed(0, "Chengdu Unicom", "119.6.6.6", "");
        ok.status = ProbeStatus::Success;
        let report = BatchReport::new(started, vec![ok]);

        let mut buf = Vec::new();
        export_json(&report, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["started_at"], "2026-01-02T03:04:05Z");
        assert_eq!(value["results"][0]["label"], "Chengdu Unicom");
        assert_eq!(value["results"][0]["status"], "success");
        assert_eq!(value["summary"]["success"], 1);
    }
}
