use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use surge_client::{Connection, ConnectionFactory, ConnectionSettings};
use surge_common::{ConnectionSnapshot, JobDescriptor, Result, SurgeError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed-size set of connections belonging to one job.
pub struct ConnectionPool {
    connections: Vec<Arc<dyn Connection>>,
}

impl ConnectionPool {
    /// Create `job.connections` connections through `factory`.
    pub fn build(job: &JobDescriptor, factory: &dyn ConnectionFactory) -> Result<Self> {
        let connections = (0..job.connections)
            .map(|index| factory.create(&ConnectionSettings::from_descriptor(job, index)))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| SurgeError::Initialization(format!("failed to create connection: {e}")))?;
        Ok(Self { connections })
    }

    pub fn from_connections(connections: Vec<Arc<dyn Connection>>) -> Self {
        Self { connections }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connections(&self) -> &[Arc<dyn Connection>] {
        &self.connections
    }

    /// Initialize every connection concurrently and wait for all of them.
    ///
    /// A failure never aborts its siblings; the first failure by connection
    /// index is returned once everything has settled.
    pub async fn initialize_all(
        &self,
        cancel: &CancellationToken,
        per_connection: Option<Duration>,
    ) -> Result<()> {
        let outcomes = join_all(self.connections.iter().enumerate().map(|(index, conn)| async move {
            let outcome = match per_connection {
                Some(limit) => match timeout(limit, conn.initialize(cancel)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SurgeError::Network(format!("timed out after {limit:?}"))),
                },
                None => conn.initialize(cancel).await,
            };
            (index, outcome)
        }))
        .await;

        let mut first_failure = None;
        for (index, outcome) in outcomes {
            if let Err(e) = outcome {
                warn!(index, error = %e, "connection failed to initialize");
                first_failure.get_or_insert(SurgeError::Initialization(format!("connection {index}: {e}")));
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => {
                debug!(count = self.len(), "all connections initialized");
                Ok(())
            }
        }
    }

    /// Dispose every connection concurrently. Failures are logged, never returned.
    pub async fn dispose_all(&self) {
        let outcomes = join_all(self.connections.iter().map(|conn| conn.dispose())).await;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            if let Err(e) = outcome {
                warn!(index, error = %e, "connection failed to dispose");
            }
        }
    }

    pub fn stop_collecting(&self) {
        for conn in &self.connections {
            conn.stop_collecting();
        }
    }

    /// Sum of the live request counters.
    pub fn request_total(&self) -> u64 {
        self.connections.iter().map(|c| c.request_count()).sum()
    }

    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.connections.iter().map(|c| c.snapshot()).collect()
    }
}
