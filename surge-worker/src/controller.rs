use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use surge_client::ConnectionFactory;
use surge_common::{
    unix_now_millis, ClientJobState, JobDescriptor, JobResult, Result, SurgeError,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::WorkerConfig;
use crate::pool::ConnectionPool;
use crate::scenario::ScenarioRegistry;
use crate::stats;

/// Job clock, set when the job enters `Running`.
#[derive(Default)]
struct Stopwatch {
    started: Option<Instant>,
}

struct JobInner {
    descriptor: JobDescriptor,
    factory: Arc<dyn ConnectionFactory>,
    registry: Arc<ScenarioRegistry>,
    config: WorkerConfig,
    state: watch::Sender<ClientJobState>,
    pool: Mutex<Option<Arc<ConnectionPool>>>,
    /// Fires when the run duration elapses or a stop is requested.
    deadline: CancellationToken,
    /// One-shot gate: whoever flips it runs the stop routine.
    stop_gate: AtomicBool,
    started: AtomicBool,
    released: AtomicBool,
    clock: Mutex<Stopwatch>,
    result: Mutex<JobResult>,
}

/// Handle to one load-test job. Clones share the same job.
///
/// The driver calls [`Job::start`], may call [`Job::stop`] any number of
/// times from any thread, reads [`Job::result`] once the job is
/// `Completed`, and finally calls [`Job::release`].
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    pub fn new(
        descriptor: JobDescriptor,
        factory: Arc<dyn ConnectionFactory>,
        registry: Arc<ScenarioRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ClientJobState::Created);
        let result = JobResult::new(descriptor.id.clone());
        Self {
            inner: Arc::new(JobInner {
                descriptor,
                factory,
                registry,
                config,
                state,
                pool: Mutex::new(None),
                deadline: CancellationToken::new(),
                stop_gate: AtomicBool::new(false),
                started: AtomicBool::new(false),
                released: AtomicBool::new(false),
                clock: Mutex::new(Stopwatch::default()),
                result: Mutex::new(result),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.descriptor.id
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.inner.descriptor
    }

    pub fn state(&self) -> ClientJobState {
        *self.inner.state.borrow()
    }

    /// Validate the job, open every connection and start the clock.
    ///
    /// Returns once the job is `Running`; the scenario, the deadline and the
    /// final stop continue on a background task. Only configuration and
    /// initialization failures are returned here.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let scenario = inner.descriptor.validate()?.to_string();

        if inner.started.swap(true, Ordering::AcqRel) {
            return Err(SurgeError::Configuration("job has already been started".to_string()));
        }
        if !inner.advance(ClientJobState::Initializing) {
            return Err(SurgeError::Configuration("job was stopped before it started".to_string()));
        }

        info!(
            job = %inner.descriptor.id,
            span_id = inner.descriptor.span_id.as_deref().unwrap_or("-"),
            connections = inner.descriptor.connections,
            scenario = %scenario,
            url = %inner.descriptor.server_url,
            "initializing job"
        );

        let pool = inner.pool_or_build().map_err(|e| inner.fail(e))?;
        pool.initialize_all(&inner.deadline, inner.config.initialize_timeout)
            .await
            .map_err(|e| inner.fail(e))?;

        {
            let mut clock = inner.clock.lock();
            // A stop that already won the gate has read an unstarted clock.
            if inner.stop_gate.load(Ordering::Acquire) || !inner.advance(ClientJobState::Running) {
                warn!(job = %inner.descriptor.id, "job stopped during initialization");
                return Ok(());
            }
            clock.started = Some(Instant::now());
        }
        inner.result.lock().started_at = Some(unix_now_millis());

        let deadline = inner.deadline.clone();
        let duration = inner.descriptor.run_duration();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => deadline.cancel(),
                _ = deadline.cancelled() => {}
            }
        });

        info!(job = %inner.descriptor.id, duration = ?duration, "job running");
        let span = info_span!("job", id = %inner.descriptor.id);
        tokio::spawn(Arc::clone(inner).run(scenario, pool).instrument(span));
        Ok(())
    }

    /// Stop the job and compute its final numbers.
    ///
    /// Safe to call concurrently and repeatedly: the statistics are computed
    /// by exactly one caller, every other call returns immediately.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Tear down every connection, then wait the configured cooldown.
    pub async fn release(&self) {
        let inner = &self.inner;
        if inner.released.swap(true, Ordering::AcqRel) {
            debug!(job = %inner.descriptor.id, "job already released");
            return;
        }
        if self.state() != ClientJobState::Completed {
            warn!(job = %inner.descriptor.id, state = ?self.state(), "release called before the job completed");
        }

        let pool = inner.pool.lock().clone();
        if let Some(pool) = pool {
            pool.stop_collecting();
            pool.dispose_all().await;
        }
        inner.factory.release();

        tokio::time::sleep(inner.config.release_cooldown).await;
        info!(job = %inner.descriptor.id, "job released");
    }

    /// Wait until the job is `Completed` and return its result.
    /// Only resolves for a job whose `start` succeeded or which was stopped.
    pub async fn wait(&self) -> JobResult {
        let mut state = self.inner.state.subscribe();
        // `inner` owns the sender, so the channel cannot close while we wait.
        state.wait_for(|s| *s == ClientJobState::Completed).await.ok();
        self.snapshot()
    }

    /// The final result, once the job is `Completed`.
    pub fn result(&self) -> Option<JobResult> {
        match self.state() {
            ClientJobState::Completed => Some(self.snapshot()),
            _ => None,
        }
    }

    /// Current view of the result, including fields still being filled in.
    pub fn snapshot(&self) -> JobResult {
        // State first: a `Completed` state guarantees the final numbers are in place.
        let state = self.state();
        let mut result = self.inner.result.lock().clone();
        result.state = state;
        result
    }

    /// Record that the driver has just talked to this job.
    pub fn touch(&self) {
        self.inner.result.lock().last_driver_communication = Some(unix_now_millis());
    }
}

impl JobInner {
    /// Move the state forward; returns `false` if `next` is not ahead of the current state.
    fn advance(&self, next: ClientJobState) -> bool {
        self.state.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn pool_or_build(&self) -> Result<Arc<ConnectionPool>> {
        let mut slot = self.pool.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(ConnectionPool::build(&self.descriptor, self.factory.as_ref())?);
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// Record a fatal start error on the result and hand it back.
    fn fail(&self, e: SurgeError) -> SurgeError {
        error!(job = %self.descriptor.id, error = %e, "job failed to start");
        self.result.lock().append_error(&e.to_string());
        e
    }

    async fn run(self: Arc<Self>, scenario: String, pool: Arc<ConnectionPool>) {
        if let Err(e) = self.registry.run(&scenario, pool.connections(), self.deadline.clone()).await {
            error!(error = %e, "scenario failed");
            self.result.lock().append_error(&e.to_string());
        }

        // The job always runs for its full duration unless stopped.
        self.deadline.cancelled().await;
        self.stop();
    }

    fn stop(&self) {
        self.deadline.cancel();
        if self
            .stop_gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job = %self.descriptor.id, "stop already handled");
            return;
        }

        let elapsed_ms = {
            let clock = self.clock.lock();
            clock.started.map(|t| t.elapsed().as_secs_f64() * 1000.0).unwrap_or(0.0)
        };

        let pool = self.pool.lock().clone();
        let snapshot = pool.map(|p| p.snapshot()).unwrap_or_default();

        {
            let mut result = self.result.lock();
            // Handshakes are never recorded, so every counter starts at zero with the clock.
            match stats::compute_throughput(0, &snapshot, elapsed_ms) {
                Some(throughput) => {
                    result.requests = throughput.delta;
                    result.requests_per_second = throughput.requests_per_second;
                    result.min_requests_per_connection = throughput.min_per_connection;
                    result.max_requests_per_connection = throughput.max_per_connection;
                    result.latency = stats::compute_latency(&snapshot, self.descriptor.latency_mode());
                }
                None => result.append_error("job failed to run: no time elapsed on the job clock"),
            }
            result.duration_ms = elapsed_ms;
        }

        self.advance(ClientJobState::Completed);

        let result = self.result.lock();
        info!(
            job = %self.descriptor.id,
            requests = result.requests,
            rps = %format!("{:.1}", result.requests_per_second),
            latency_avg_ms = %format!("{:.2}", result.latency.average),
            duration_ms = %format!("{:.0}", result.duration_ms),
            "job completed"
        );
    }
}
