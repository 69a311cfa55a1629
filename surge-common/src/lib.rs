use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod job;
pub mod result;

pub use job::{ClientJobState, JobDescriptor, LatencyMode};
pub use result::{
    ConnectionSnapshot, JobResult, LatencyPercentiles, LatencySamples, LatencySummary,
};

/// Property key naming the scenario a job runs.
pub const SCENARIO_PROPERTY: &str = "scenario";

/// Property key carrying an optional log level hint (`error`..`trace`).
pub const LOG_LEVEL_PROPERTY: &str = "loglevel";

/// Error types for Surge operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Scenario failed: {0}")]
    ScenarioRuntime(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Invalid job descriptor: {0}")]
    Descriptor(String),
}

/// Result type for Surge operations
pub type Result<T> = std::result::Result<T, SurgeError>;

/// Milliseconds since the Unix epoch; 0 if the system clock is before it.
pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
