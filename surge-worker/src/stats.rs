//! Job-level throughput and latency from per-connection snapshots.

use surge_common::{ConnectionSnapshot, LatencyMode, LatencyPercentiles, LatencySamples, LatencySummary};
use tracing::warn;

/// Request totals over the measured window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub total: u64,
    pub delta: u64,
    pub requests_per_second: f64,
    pub min_per_connection: u64,
    pub max_per_connection: u64,
}

/// Sum request counts and derive the rate over `elapsed_ms`.
///
/// Returns `None` when no time elapsed: the job never ran, and latency
/// should not be computed either.
pub fn compute_throughput(
    previous_total: u64,
    snapshot: &[ConnectionSnapshot],
    elapsed_ms: f64,
) -> Option<Throughput> {
    if elapsed_ms <= 0.0 {
        warn!(elapsed_ms, "job failed to run: no time elapsed on the job clock");
        return None;
    }

    let total: u64 = snapshot.iter().map(|c| c.requests).sum();
    let delta = total.saturating_sub(previous_total);
    let min_per_connection = snapshot.iter().map(|c| c.requests).min().unwrap_or(0);
    let max_per_connection = snapshot.iter().map(|c| c.requests).max().unwrap_or(0);

    Some(Throughput {
        total,
        delta,
        requests_per_second: delta as f64 / elapsed_ms * 1000.0,
        min_per_connection,
        max_per_connection,
    })
}

/// Merge every connection's latency data according to `mode`.
///
/// Snapshots whose shape does not match `mode` contribute nothing.
pub fn compute_latency(snapshot: &[ConnectionSnapshot], mode: LatencyMode) -> LatencySummary {
    match mode {
        LatencyMode::Detailed => {
            let mut samples: Vec<f64> = snapshot
                .iter()
                .filter_map(|c| match &c.latency {
                    LatencySamples::Detailed(samples) => Some(samples.as_slice()),
                    LatencySamples::Approximate { .. } => None,
                })
                .flatten()
                .copied()
                .collect();

            let average = if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<f64>() / samples.len() as f64
            };

            samples.sort_unstable_by(|a, b| a.total_cmp(b));
            LatencySummary {
                average,
                percentiles: Some(LatencyPercentiles {
                    p50: percentile(50.0, &samples),
                    p75: percentile(75.0, &samples),
                    p90: percentile(90.0, &samples),
                    p99: percentile(99.0, &samples),
                    p100: percentile(100.0, &samples),
                }),
            }
        }
        LatencyMode::Approximate => {
            let (sum, count) = snapshot.iter().fold((0.0, 0u64), |(sum, count), c| match c.latency {
                LatencySamples::Approximate { sum: s, count: n } => (sum + s, count + n),
                LatencySamples::Detailed(_) => (sum, count),
            });
            let average = if count != 0 { sum / count as f64 } else { 0.0 };
            LatencySummary { average, percentiles: None }
        }
    }
}

/// Exact-rank interpolated percentile of an ascending slice.
///
/// For `p < 100` the rank is `i = p * n / 100 + 0.5`; the result blends the
/// elements at 1-based ranks `floor(i)` and `ceil(i)` by the fractional part
/// of `i`. Ranks outside the slice are clamped. Returns 0 for an empty slice.
pub fn percentile(p: f64, sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if p >= 100.0 {
        return sorted[n - 1];
    }

    let i = p * n as f64 / 100.0 + 0.5;
    let frac = i - i.floor();
    let clamp = |rank: f64| ((rank as i64) - 1).clamp(0, n as i64 - 1) as usize;
    let lo = clamp(i.floor());
    let hi = clamp(i.ceil());

    (1.0 - frac) * sorted[lo] + frac * sorted[hi]
}
