//! Prometheus instrumentation for the dispatcher (spec §4.9, §6).
//!
//! Bucket boundaries for `job_duration_seconds` are pinned by the spec so
//! dashboards built against them stay stable across deployments.
use metrics::{counter, gauge, histogram};

pub const JOB_DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1200.0, 1800.0,
];

pub fn record_enqueued(queue: &'static str) {
    counter!("queue_enqueued_total", "queue" => queue).increment(1);
}

pub fn record_retry(queue: &'static str) {
    counter!("queue_retries_total", "queue" => queue).increment(1);
}

pub fn record_dead_lettered() {
    counter!("dead_letter_total").increment(1);
}

pub fn record_job_duration(seconds: f64) {
    histogram!("job_duration_seconds").record(seconds);
}

pub fn set_queue_depth(queue: &'static str, depth: u64) {
    gauge!("queue_depth", "queue" => queue).set(depth as f64);
}

pub fn set_workers_busy(count: u64) {
    gauge!("workers_busy").set(count as f64);
}
