use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_common::{ConnectionSnapshot, JobDescriptor, LatencyMode, Result, SurgeError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub mod stats;
pub use stats::ConnectionStats;

/// Everything a factory needs to open one connection of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub index: usize,
    pub server_url: String,
    pub http_method: String,
    pub headers: HashMap<String, String>,
    pub latency_mode: LatencyMode,
}

impl ConnectionSettings {
    pub fn from_descriptor(job: &JobDescriptor, index: usize) -> Self {
        Self {
            index,
            server_url: job.server_url.clone(),
            http_method: job.http_method.clone(),
            headers: job.headers.clone(),
            latency_mode: job.latency_mode(),
        }
    }
}

/// One persistent client session against the server under test.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open the session. Implementations must give up once `cancel` fires.
    /// The handshake is not a measured request and must not be recorded.
    async fn initialize(&self, cancel: &CancellationToken) -> Result<()>;

    async fn dispose(&self) -> Result<()>;

    /// Issue one request for `path` and record it.
    async fn send(&self, path: &str) -> Result<()>;

    fn request_count(&self) -> u64;

    fn snapshot(&self) -> ConnectionSnapshot;

    /// Detach stat collection; requests completing afterwards are not counted.
    fn stop_collecting(&self);
}

/// Creates the connections of a job and owns whatever they share.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>>;

    /// Release resources shared by every connection this factory created.
    fn release(&self) {}
}

/// Plain HTTP transport: each connection owns a single keep-alive session.
pub struct HttpConnectionFactory {
    connect_timeout: Duration,
}

impl HttpConnectionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for HttpConnectionFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn create(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(1)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| SurgeError::Network(e.to_string()))?;
        Ok(Arc::new(HttpConnection::with_client(settings.clone(), http_client)?))
    }
}

/// HTTP connection recording one sample per successful request
pub struct HttpConnection {
    pub settings: ConnectionSettings,
    /// Sent as `X-Connection-Id` so the server can tell sessions apart.
    pub connection_id: String,
    method: reqwest::Method,
    http_client: reqwest::Client,
    stats: ConnectionStats,
    open: AtomicBool,
}

impl HttpConnection {
    /// Create a connection with its own HTTP client
    pub fn new(settings: ConnectionSettings) -> Result<Self> {
        Self::with_client(settings, reqwest::Client::new())
    }

    pub fn with_client(settings: ConnectionSettings, http_client: reqwest::Client) -> Result<Self> {
        let method = reqwest::Method::from_bytes(settings.http_method.to_uppercase().as_bytes())
            .map_err(|_| {
                SurgeError::Configuration(format!("invalid HTTP method '{}'", settings.http_method))
            })?;
        let stats = ConnectionStats::new(settings.latency_mode);
        Ok(Self {
            settings,
            connection_id: Uuid::new_v4().to_string(),
            method,
            http_client,
            stats,
            open: AtomicBool::new(false),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Build the URL for `path` relative to the server under test.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.settings.server_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", base)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Perform one request and return its latency; the body is read to the end.
    async fn request(&self, path: &str) -> Result<Duration> {
        let url = self.build_url(path);
        let mut request = self
            .http_client
            .request(self.method.clone(), &url)
            .header("X-Connection-Id", &self.connection_id);
        for (name, value) in &self.settings.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| SurgeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, response).await);
        }

        response
            .bytes()
            .await
            .map_err(|e| SurgeError::Network(e.to_string()))?;

        Ok(started.elapsed())
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(SurgeError::Network(format!(
                    "connection {} cancelled during handshake",
                    self.settings.index
                )))
            }
            handshake = self.request("") => {
                handshake?;
                self.open.store(true, Ordering::Release);
                debug!(index = self.settings.index, id = %self.connection_id, "connection open");
                Ok(())
            }
        }
    }

    async fn dispose(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn send(&self, path: &str) -> Result<()> {
        if !self.is_open() {
            return Err(SurgeError::Network(format!(
                "connection {} is not open",
                self.settings.index
            )));
        }
        let latency = self.request(path).await?;
        self.stats.record(latency);
        Ok(())
    }

    fn request_count(&self) -> u64 {
        self.stats.request_count()
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        self.stats.snapshot()
    }

    fn stop_collecting(&self) {
        self.stats.stop_collecting();
    }
}

async fn parse_error_response(status: reqwest::StatusCode, response: reqwest::Response) -> SurgeError {
    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => body.trim().to_string(),
        _ => status.canonical_reason().unwrap_or("Unknown status").to_string(),
    };
    SurgeError::Http(status.as_u16(), message)
}
