use std::path::Path;
use std::time::Duration;
use surge_common::{JobDescriptor, Result, SurgeError};

/// Pause after all connections are disposed, giving the transport time to
/// finish closing sessions out of band.
pub const RELEASE_COOLDOWN: Duration = Duration::from_secs(5);

/// Upper bound on a single connection's initialization.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker-side knobs that are not part of the job descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub release_cooldown: Duration,
    /// `None` waits for initialization without a per-connection deadline.
    pub initialize_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            release_cooldown: RELEASE_COOLDOWN,
            initialize_timeout: Some(INITIALIZE_TIMEOUT),
        }
    }
}

/// Read a JSON job descriptor from `path`.
pub fn load_descriptor(path: &Path) -> Result<JobDescriptor> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SurgeError::Descriptor(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| SurgeError::Descriptor(e.to_string()))
}
