//! Drain and node span helpers.
//!
//! Every drain gets a `workq.drain` span keyed by a fresh id; every executed
//! node runs inside a `workq.node` span nested beneath it.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one drain, across all of its slices.
///
/// The totals fields are declared empty and filled by [`record_drain_totals`].
pub fn start_drain_span(drain_id: &Uuid) -> Span {
    tracing::debug_span!(
        "workq.drain",
        "workq.drain.id" = %drain_id,
        "workq.drain.executed" = tracing::field::Empty,
        "workq.drain.failed" = tracing::field::Empty,
    )
}

/// Start a span for a single node's `execute`.
pub fn start_node_span(description: &str) -> Span {
    tracing::trace_span!("workq.node", "workq.node.description" = description)
}

/// Record how many nodes a drain ran and how many of them failed.
pub fn record_drain_totals(span: &Span, executed: usize, failed: usize) {
    span.record("workq.drain.executed", executed as u64);
    span.record("workq.drain.failed", failed as u64);
}
