use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use surge_common::{ConnectionSnapshot, LatencyMode, LatencySamples};

enum LatencyRecorder {
    Detailed(Mutex<Vec<f64>>),
    Approximate(Mutex<(f64, u64)>),
}

/// Per-connection request counter and latency recorder.
///
/// The connection's own request loop writes; the job controller reads once
/// the clock has stopped. After [`ConnectionStats::stop_collecting`] every
/// further record is dropped.
pub struct ConnectionStats {
    requests: AtomicU64,
    collecting: AtomicBool,
    latency: LatencyRecorder,
}

impl ConnectionStats {
    pub fn new(mode: LatencyMode) -> Self {
        let latency = match mode {
            LatencyMode::Detailed => LatencyRecorder::Detailed(Mutex::new(Vec::new())),
            LatencyMode::Approximate => LatencyRecorder::Approximate(Mutex::new((0.0, 0))),
        };
        Self { requests: AtomicU64::new(0), collecting: AtomicBool::new(true), latency }
    }

    pub fn mode(&self) -> LatencyMode {
        match self.latency {
            LatencyRecorder::Detailed(_) => LatencyMode::Detailed,
            LatencyRecorder::Approximate(_) => LatencyMode::Approximate,
        }
    }

    /// Record one completed request.
    pub fn record(&self, latency: Duration) {
        if !self.collecting.load(Ordering::Acquire) {
            return;
        }
        let ms = latency.as_nanos() as f64 / 1_000_000.0;
        match &self.latency {
            LatencyRecorder::Detailed(samples) => samples.lock().push(ms),
            LatencyRecorder::Approximate(running) => {
                let mut running = running.lock();
                running.0 += ms;
                running.1 += 1;
            }
        }
        self.requests.fetch_add(1, Ordering::AcqRel);
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    pub fn stop_collecting(&self) {
        self.collecting.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let latency = match &self.latency {
            LatencyRecorder::Detailed(samples) => LatencySamples::Detailed(samples.lock().clone()),
            LatencyRecorder::Approximate(running) => {
                let (sum, count) = *running.lock();
                LatencySamples::Approximate { sum, count }
            }
        };
        ConnectionSnapshot { requests: self.request_count(), latency }
    }
}
