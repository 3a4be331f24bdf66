//! Metric instrument factories for workq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"workq"` meter. Without a
//! registered provider they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for workq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("workq")
}

/// Counter: nodes inserted into a queue.
/// Labels: `placement` ("head" | "tail").
pub fn nodes_queued() -> Counter<u64> {
    meter()
        .u64_counter("workq.nodes.queued")
        .with_description("Number of nodes inserted into a work queue")
        .build()
}

/// Counter: nodes dequeued and executed.
/// Labels: `result` ("ok" | "error").
pub fn nodes_executed() -> Counter<u64> {
    meter()
        .u64_counter("workq.nodes.executed")
        .with_description("Number of nodes executed")
        .build()
}

/// Counter: times a drain handed control back to its host.
pub fn drain_yields() -> Counter<u64> {
    meter()
        .u64_counter("workq.drain.yields")
        .with_description("Number of yield points taken while draining")
        .build()
}

/// Histogram: node execution time in milliseconds.
pub fn node_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workq.node.duration_ms")
        .with_description("Node execute duration in milliseconds")
        .with_unit("ms")
        .build()
}
