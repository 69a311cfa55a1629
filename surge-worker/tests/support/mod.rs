#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_client::{Connection, ConnectionFactory, ConnectionSettings, ConnectionStats};
use surge_common::{ConnectionSnapshot, JobDescriptor, LatencyMode, Result, SurgeError, SCENARIO_PROPERTY};
use surge_worker::Scenario;
use tokio_util::sync::CancellationToken;

/// How mock connections behave; `None` means never.
#[derive(Clone, Default)]
pub struct Behavior {
    pub fail_initialize_at: Option<usize>,
    pub fail_dispose: bool,
    /// Fail the send after this many successful sends.
    pub fail_send_after: Option<usize>,
    pub initialize_delay: Duration,
    /// Finish the initialize delay even after cancellation.
    pub ignore_cancel: bool,
    /// Applied to every send so request loops yield to the runtime.
    pub send_delay: Duration,
}

impl Behavior {
    pub fn new() -> Self {
        Self { send_delay: Duration::from_millis(1), ..Default::default() }
    }
}

pub struct MockConnection {
    pub settings: ConnectionSettings,
    behavior: Behavior,
    stats: ConnectionStats,
    pub initialized: AtomicBool,
    pub disposed: AtomicBool,
    pub snapshots: AtomicUsize,
    pub initializations: AtomicUsize,
    pub paths: Mutex<Vec<String>>,
}

impl MockConnection {
    pub fn new(settings: ConnectionSettings, behavior: Behavior) -> Self {
        let stats = ConnectionStats::new(settings.latency_mode);
        Self {
            settings,
            behavior,
            stats,
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            snapshots: AtomicUsize::new(0),
            initializations: AtomicUsize::new(0),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn detailed(index: usize) -> Arc<Self> {
        Arc::new(Self::new(settings(index, LatencyMode::Detailed), Behavior::new()))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn is_collecting(&self) -> bool {
        self.stats.is_collecting()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshots.load(Ordering::Acquire)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        if self.behavior.ignore_cancel {
            tokio::time::sleep(self.behavior.initialize_delay).await;
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SurgeError::Network("cancelled".to_string())),
                _ = tokio::time::sleep(self.behavior.initialize_delay) => {}
            }
        }
        if self.behavior.fail_initialize_at == Some(self.settings.index) {
            return Err(SurgeError::Network("connection refused".to_string()));
        }
        self.initializations.fetch_add(1, Ordering::AcqRel);
        self.initialized.store(true, Ordering::Release);
        self.disposed.store(false, Ordering::Release);
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.disposed.store(true, Ordering::Release);
        if self.behavior.fail_dispose {
            return Err(SurgeError::Network("already closed".to_string()));
        }
        Ok(())
    }

    async fn send(&self, path: &str) -> Result<()> {
        tokio::time::sleep(self.behavior.send_delay).await;
        let sent = {
            let mut paths = self.paths.lock();
            if let Some(limit) = self.behavior.fail_send_after {
                if paths.len() >= limit {
                    return Err(SurgeError::Http(500, format!("{path} failed")));
                }
            }
            paths.push(path.to_string());
            paths.len()
        };
        // 2, 4, 6, ... ms so detailed and approximate summaries are predictable.
        self.stats.record(Duration::from_millis(2 * sent as u64));
        Ok(())
    }

    fn request_count(&self) -> u64 {
        self.stats.request_count()
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshots.fetch_add(1, Ordering::AcqRel);
        self.stats.snapshot()
    }

    fn stop_collecting(&self) {
        self.stats.stop_collecting();
    }
}

pub struct MockFactory {
    behavior: Behavior,
    pub created: Mutex<Vec<Arc<MockConnection>>>,
    pub released: AtomicBool,
}

impl MockFactory {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self { behavior, created: Mutex::new(Vec::new()), released: AtomicBool::new(false) })
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.created.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl ConnectionFactory for MockFactory {
    fn create(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>> {
        let conn = Arc::new(MockConnection::new(settings.clone(), self.behavior.clone()));
        self.created.lock().push(Arc::clone(&conn));
        Ok(conn)
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// Waits for cancellation without sending anything.
pub struct Idle;

#[async_trait]
impl Scenario for Idle {
    async fn run(&self, _connections: &[Arc<dyn Connection>], cancel: CancellationToken) -> Result<()> {
        cancel.cancelled().await;
        Ok(())
    }
}

/// Fails immediately with a transport error.
pub struct Broken;

#[async_trait]
impl Scenario for Broken {
    async fn run(&self, _connections: &[Arc<dyn Connection>], _cancel: CancellationToken) -> Result<()> {
        Err(SurgeError::Network("socket reset".to_string()))
    }
}

pub fn settings(index: usize, latency_mode: LatencyMode) -> ConnectionSettings {
    ConnectionSettings {
        index,
        server_url: "http://127.0.0.1:5000".to_string(),
        http_method: "GET".to_string(),
        headers: HashMap::new(),
        latency_mode,
    }
}

pub fn descriptor(connections: usize, duration: u64, scenario: &str) -> JobDescriptor {
    let mut properties = HashMap::new();
    properties.insert(SCENARIO_PROPERTY.to_string(), scenario.to_string());
    JobDescriptor {
        id: "job-1".to_string(),
        span_id: Some("span-1".to_string()),
        connections,
        duration,
        server_url: "http://127.0.0.1:5000".to_string(),
        http_method: "GET".to_string(),
        headers: HashMap::new(),
        properties,
        collect_latency_detail: None,
    }
}

pub fn as_dyn(connections: &[Arc<MockConnection>]) -> Vec<Arc<dyn Connection>> {
    connections.iter().map(|c| Arc::clone(c) as Arc<dyn Connection>).collect()
}
