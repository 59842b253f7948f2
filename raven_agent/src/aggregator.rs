//! Status Aggregator: one `StatusSnapshot` from the inspector, the sampler and the
//! process uptime. Recomputed from scratch on every call.

use crate::probe::ProcessInspector;
use crate::sampler::TelemetrySampler;
use crate::types::{unix_millis, OverallState, ResourceMetrics, StatusSnapshot, TelemetryStats};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use tracing::error;

pub struct StatusAggregator {
    inspector: ProcessInspector,
    sampler: TelemetrySampler,
    started: Instant,
    // last timestamp handed out; keeps timestampMs non-decreasing across wall-clock steps
    last_ts: AtomicU64,
}

impl StatusAggregator {
    pub fn new(inspector: ProcessInspector, sampler: TelemetrySampler, started: Instant) -> Self {
        Self {
            inspector,
            sampler,
            started,
            last_ts: AtomicU64::new(0),
        }
    }

    pub fn inspector(&self) -> &ProcessInspector {
        &self.inspector
    }

    pub fn sampler(&self) -> &TelemetrySampler {
        &self.sampler
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Fan out to every collaborator concurrently. A collaborator that panics is logged
    /// and replaced by its all-default value; the snapshot is always produced.
    pub async fn build_snapshot(&self) -> StatusSnapshot {
        let now = SystemTime::now();
        let (services, resource_metrics, telemetry_stats) = tokio::join!(
            guarded("services", self.inspector.sample_services(), || {
                self.inspector.all_down()
            }),
            guarded(
                "resource metrics",
                self.inspector.sample_resource_metrics(),
                ResourceMetrics::default,
            ),
            guarded(
                "telemetry",
                self.sampler.sample_at(now),
                TelemetryStats::default,
            ),
        );

        let wall = unix_millis(now);
        let prev = self.last_ts.fetch_max(wall, Ordering::AcqRel);
        StatusSnapshot {
            timestamp_ms: wall.max(prev),
            uptime_seconds: self.uptime_seconds(),
            overall_state: OverallState::Connected,
            services,
            resource_metrics,
            telemetry_stats,
        }
    }
}

async fn guarded<T>(what: &str, fut: impl Future<Output = T>, fallback: impl FnOnce() -> T) -> T {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(v) => v,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!("{what} sampling panicked, using defaults: {msg}");
            fallback()
        }
    }
}
