//! Metric instruments.
//!
//! Instruments come from the global `MeterProvider`; without an OTLP
//! endpoint that is the no-op provider and recording costs nothing.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("bulkpost")
}

/// Counter: operation invocations. Labels: `success`.
pub fn task_executions() -> Counter<u64> {
    meter()
        .u64_counter("bulkpost.task.executions")
        .with_description("Number of operation invocations")
        .build()
}

/// Counter: failed items. Labels: `terminal`.
pub fn task_failures() -> Counter<u64> {
    meter()
        .u64_counter("bulkpost.task.failures")
        .with_description("Number of items that failed with no retries left")
        .build()
}

pub fn task_retries() -> Counter<u64> {
    meter()
        .u64_counter("bulkpost.task.retries")
        .with_description("Number of items queued for a retry pass")
        .build()
}

pub fn dispatch_passes() -> Counter<u64> {
    meter()
        .u64_counter("bulkpost.dispatch.passes")
        .with_description("Number of dispatch passes started")
        .build()
}

pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("bulkpost.task.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
