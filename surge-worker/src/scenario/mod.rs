use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use surge_client::Connection;
use surge_common::{Result, SurgeError};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod builtin;

/// A named interaction behavior run across every connection of a job.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Drive `connections` until the work is done or `cancel` fires.
    /// Cancellation is checked at the scenario's own granularity.
    async fn run(&self, connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()>;
}

/// Scenarios shipped with the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Navigator,
    Clicker,
    Rogue,
    BlazingPizza,
    Reconnects,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 5] = [
        ScenarioKind::Navigator,
        ScenarioKind::Clicker,
        ScenarioKind::Rogue,
        ScenarioKind::BlazingPizza,
        ScenarioKind::Reconnects,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_name() == name)
    }

    pub fn as_name(&self) -> &'static str {
        match self {
            ScenarioKind::Navigator => "Navigator",
            ScenarioKind::Clicker => "Clicker",
            ScenarioKind::Rogue => "Rogue",
            ScenarioKind::BlazingPizza => "BlazingPizza",
            ScenarioKind::Reconnects => "Reconnects",
        }
    }

    /// `Reconnects` is registered but cannot be selected by a job.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ScenarioKind::Reconnects)
    }

    pub fn scenario(&self) -> Arc<dyn Scenario> {
        match self {
            ScenarioKind::Navigator => Arc::new(builtin::Navigator),
            ScenarioKind::Clicker => Arc::new(builtin::Clicker),
            ScenarioKind::Rogue => Arc::new(builtin::Rogue),
            ScenarioKind::BlazingPizza => Arc::new(builtin::BlazingPizza),
            ScenarioKind::Reconnects => Arc::new(builtin::Reconnects),
        }
    }
}

struct Registration {
    scenario: Arc<dyn Scenario>,
    enabled: bool,
}

/// Exact-name lookup table from scenario name to behavior.
pub struct ScenarioRegistry {
    entries: HashMap<String, Registration>,
}

impl ScenarioRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// A registry holding every [`ScenarioKind`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in ScenarioKind::ALL {
            let registration = Registration { scenario: kind.scenario(), enabled: kind.is_enabled() };
            registry.entries.insert(kind.as_name().to_string(), registration);
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, scenario: Arc<dyn Scenario>) {
        self.entries.insert(name.into(), Registration { scenario, enabled: true });
    }

    pub fn register_disabled(&mut self, name: impl Into<String>, scenario: Arc<dyn Scenario>) {
        self.entries.insert(name.into(), Registration { scenario, enabled: false });
    }

    /// `true` if `name` is registered and enabled.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.get(name).map(|r| r.enabled).unwrap_or(false)
    }

    /// Names a job may select, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, r)| r.enabled)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Run the scenario registered under `name`, passing `cancel` through untouched.
    pub async fn run(
        &self,
        name: &str,
        connections: &[Arc<dyn Connection>],
        cancel: CancellationToken,
    ) -> Result<()> {
        let registration = match self.entries.get(name) {
            Some(r) if r.enabled => r,
            Some(_) => return Err(SurgeError::UnknownScenario(format!("{name} (disabled)"))),
            None => return Err(SurgeError::UnknownScenario(name.to_string())),
        };

        info!(scenario = name, connections = connections.len(), "running scenario");
        registration
            .scenario
            .run(connections, cancel)
            .await
            .map_err(|e| match e {
                SurgeError::ScenarioRuntime(_) | SurgeError::UnknownScenario(_) => e,
                other => SurgeError::ScenarioRuntime(format!("{name}: {other}")),
            })
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
