use serde::{Deserialize, Serialize};

use crate::ClientJobState;

/// Latency data held by one connection, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LatencySamples {
    /// One entry per completed request, in completion order (unsorted).
    Detailed(Vec<f64>),
    Approximate { sum: f64, count: u64 },
}

/// Counters read from one connection after the job clock stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub requests: u64,
    pub latency: LatencySamples,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p99: f64,
    pub p100: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub average: f64,
    /// Only populated in detailed latency mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentiles: Option<LatencyPercentiles>,
}

/// Outcome of a job. Once the job reaches `Completed` the value no longer changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    pub state: ClientJobState,
    pub requests: u64,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub min_requests_per_connection: u64,
    pub max_requests_per_connection: u64,
    /// Accumulated failure text; each failure on its own line.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub duration_ms: f64,
    pub started_at: Option<u64>,
    pub last_driver_communication: Option<u64>,
}

impl JobResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ClientJobState::Created,
            requests: 0,
            requests_per_second: 0.0,
            latency: LatencySummary::default(),
            min_requests_per_connection: 0,
            max_requests_per_connection: 0,
            error: String::new(),
            duration_ms: 0.0,
            started_at: None,
            last_driver_communication: None,
        }
    }

    /// Append a failure without discarding earlier ones.
    pub fn append_error(&mut self, message: &str) {
        if !self.error.is_empty() {
            self.error.push('\n');
        }
        self.error.push_str(message);
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}
