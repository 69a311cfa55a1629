use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{Result, SurgeError, LOG_LEVEL_PROPERTY, SCENARIO_PROPERTY};

/// Lifecycle of a client job. Variants are declared in lifecycle order so the
/// derived `Ord` can be used to reject backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClientJobState {
    Created,
    Initializing,
    Running,
    Completed,
}

/// How per-request latencies are retained on each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatencyMode {
    /// Every sample is kept; exact percentiles are available.
    Detailed,
    /// Only a running `(sum, count)` is kept; average only.
    Approximate,
}

/// Configuration of one load-test run, as sent by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    #[serde(default)]
    pub span_id: Option<String>,
    pub connections: usize,
    /// Run length in seconds.
    pub duration: u64,
    pub server_url: String,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// `None` means detailed latency collection.
    #[serde(default)]
    pub collect_latency_detail: Option<bool>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

impl JobDescriptor {
    /// Scenario name from the property map, if present and non-empty.
    pub fn scenario(&self) -> Option<&str> {
        self.properties
            .get(SCENARIO_PROPERTY)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn log_level(&self) -> Option<&str> {
        self.properties.get(LOG_LEVEL_PROPERTY).map(String::as_str)
    }

    pub fn latency_mode(&self) -> LatencyMode {
        match self.collect_latency_detail {
            Some(false) => LatencyMode::Approximate,
            Some(true) | None => LatencyMode::Detailed,
        }
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    /// Check the fields a job cannot start without; returns the scenario name.
    pub fn validate(&self) -> Result<&str> {
        if self.connections == 0 {
            return Err(SurgeError::Configuration(
                "connections must be greater than 0".to_string(),
            ));
        }
        self.scenario().ok_or_else(|| {
            SurgeError::Configuration(format!("property '{}' is required", SCENARIO_PROPERTY))
        })
    }
}
