//! Prometheus metrics for the service.

use std::collections::HashMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use tracing::warn;

lazy_static! {
    /// Global metrics registry.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Embedding client counters.
    pub static ref EMBEDDING_BATCH_JOBS_STARTED: IntCounter = register_counter(
        "embedding_batch_jobs_started",
        "Embedding batch jobs started"
    );
    pub static ref EMBEDDING_BATCH_JOBS_SUCCEEDED: IntCounter = register_counter(
        "embedding_batch_jobs_succeeded",
        "Embedding batch jobs that completed successfully"
    );
    pub static ref EMBEDDING_BATCH_JOBS_FAILED_ASYNC: IntCounter = register_counter(
        "embedding_batch_jobs_failed_async",
        "Embedding batch requests that failed before fallback"
    );
    pub static ref EMBEDDING_BATCH_JOBS_FAILED_PER_ITEM: IntCounter = register_counter(
        "embedding_batch_jobs_failed_per_item",
        "Embedding batches that failed during per-item fallback"
    );
    pub static ref EMBEDDING_BATCH_FALLBACK_PER_ITEM_USED: IntCounter = register_counter(
        "embedding_batch_jobs_fallback_per_item_used",
        "Embedding batches that fell back to per-item requests"
    );

    /// Per-operation timing series, registered lazily by name.
    static ref TIMINGS: Mutex<HashMap<String, TimingSeries>> = Mutex::new(HashMap::new());
}

struct TimingSeries {
    count: IntCounter,
    total_ms: IntCounter,
    avg_ms: Gauge,
}

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap_or_else(|e| {
        // A malformed metric name is a programming error; fail loudly at boot.
        panic!("metric {name} can be created: {e}")
    });
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        warn!("failed to register metric {name}: {e}");
    }
    counter
}

/// Record one observation of a named timing. Exposed as `<name>_count`,
/// `<name>_total_ms` counters and a `<name>_avg_ms` gauge.
pub fn observe_timing(name: &str, elapsed_ms: u64) {
    let mut timings = match TIMINGS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if !timings.contains_key(name) {
        let count = register_counter(&format!("{name}_count"), "Timing observation count");
        let total_ms = register_counter(&format!("{name}_total_ms"), "Total elapsed milliseconds");
        let avg_ms = match Gauge::new(format!("{name}_avg_ms"), "Average elapsed milliseconds") {
            Ok(gauge) => gauge,
            Err(e) => {
                warn!("failed to create timing gauge for {name}: {e}");
                return;
            }
        };
        if let Err(e) = REGISTRY.register(Box::new(avg_ms.clone())) {
            warn!("failed to register timing gauge for {name}: {e}");
        }
        timings.insert(
            name.to_string(),
            TimingSeries {
                count,
                total_ms,
                avg_ms,
            },
        );
    }

    if let Some(series) = timings.get(name) {
        series.count.inc();
        series.total_ms.inc_by(elapsed_ms);
        let count = series.count.get();
        if count > 0 {
            series
                .avg_ms
                .set(series.total_ms.get() as f64 / count as f64);
        }
    }
}

/// Encode all registered metrics into the Prometheus text format.
pub fn encode() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {e}")))
}
