pub mod json;
pub mod report;

pub use json::*;
pub use report::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ProbeResult, ProbeStatus};

/// Counts by terminal status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success: usize,
    pub timed_out: usize,
    pub failed: usize,
}

/// Everything a presentation layer needs for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub summary: BatchSummary,
    pub results: Vec<ProbeResult>,
}

impl BatchReport {
    pub fn new(started_at: DateTime<Utc>, results: Vec<ProbeResult>) -> Self {
        let mut summary = BatchSummary::default();
        for r in &results {
            match r.status {
                ProbeStatus::Success => summary.success += 1,
                ProbeStatus::PartialTimeout { .. } => summary.timed_out += 1,
                ProbeStatus::Failed { .. } => summary.failed += 1,
            }
        }
        Self {
            started_at,
            summary,
            results,
        }
    }
}
