//! The work queue: ordered pending nodes and the loop that drains them.
//!
//! Draining always re-reads the head after each execution, so a node that
//! inserts more work through its [`Context`] sees that work honored by the
//! same drain. Nothing here is thread-safe; the queue is driven from a single
//! thread of control and `execute` calls never overlap.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, error, trace};
use uuid::Uuid;

use crate::error::{Error, NodeError, Result};
use crate::event::{EventKind, Journal, QueueEvent};
use crate::model::{FnNode, Node, Placement};
use crate::schedule::{YieldPoint, YieldPolicy};
use crate::telemetry::drain::{record_drain_totals, start_drain_span, start_node_span};
use crate::telemetry::metrics;

type BoxNode<C> = Box<dyn Node<C>>;

/// Node storage plus the optional journal. Shared by [`WorkQueue`] and the
/// [`Context`] handed to executing nodes so both insert identically.
struct Pending<C> {
    nodes: VecDeque<BoxNode<C>>,
    journal: Option<Journal>,
}

impl<C> Pending<C> {
    fn insert(&mut self, node: BoxNode<C>, placement: Placement) {
        let depth = self.nodes.len() + 1;
        trace!(description = node.description(), %placement, depth, "node queued");
        metrics::nodes_queued().add(1, &[KeyValue::new("placement", placement.as_str())]);
        if let Some(journal) = self.journal.as_mut() {
            journal.record(EventKind::NodeQueued {
                description: node.description().to_string(),
                placement,
                depth,
            });
        }

        match placement {
            Placement::Head => self.nodes.push_front(node),
            Placement::Tail => self.nodes.push_back(node),
        }
    }

    fn record(&mut self, kind: EventKind) {
        if let Some(journal) = self.journal.as_mut() {
            journal.record(kind);
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What an executing node can see: the caller's state and the queue it came
/// from.
pub struct Context<'a, C> {
    pending: &'a mut Pending<C>,
    state: &'a mut C,
}

impl<C> Context<'_, C> {
    pub fn state(&mut self) -> &mut C {
        &mut *self.state
    }

    /// Queue `node` behind everything currently pending.
    pub fn append(&mut self, node: impl Node<C> + 'static) {
        self.pending.insert(Box::new(node), Placement::Tail);
    }

    /// Queue `node` to run right after the current one returns.
    pub fn prepend(&mut self, node: impl Node<C> + 'static) {
        self.pending.insert(Box::new(node), Placement::Head);
    }

    pub fn append_fn<F>(&mut self, description: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Context<'_, C>) -> std::result::Result<(), NodeError> + 'static,
    {
        self.append(FnNode::new(description, f));
    }

    pub fn prepend_fn<F>(&mut self, description: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Context<'_, C>) -> std::result::Result<(), NodeError> + 'static,
    {
        self.prepend(FnNode::new(description, f));
    }

    /// Nodes still waiting, not counting the one executing.
    pub fn pending(&self) -> usize {
        self.pending.nodes.len()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A node whose `execute` failed. The node was consumed regardless.
#[derive(Debug)]
pub struct NodeFailure {
    pub description: String,
    pub error: NodeError,
}

impl From<NodeFailure> for Error {
    fn from(failure: NodeFailure) -> Self {
        Error::NodeFailed {
            description: failure.description,
            source: failure.error,
        }
    }
}

/// Outcome of a drain or slice.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Nodes dequeued and executed, failed ones included.
    pub executed: usize,
    pub failures: Vec<NodeFailure>,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: DrainReport) {
        self.executed += other.executed;
        self.failures.extend(other.failures);
    }

    /// Number of executed nodes, or the first failure.
    pub fn into_result(self) -> Result<usize> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.into()),
            None => Ok(self.executed),
        }
    }
}

/// Where a slice stopped.
#[derive(Debug)]
pub enum Slice {
    /// The yield point asked for control back; more work is pending.
    Yielded(DrainReport),
    /// The queue is empty.
    Drained(DrainReport),
}

impl Slice {
    pub fn is_drained(&self) -> bool {
        matches!(self, Slice::Drained(_))
    }

    pub fn report(&self) -> &DrainReport {
        match self {
            Slice::Yielded(report) | Slice::Drained(report) => report,
        }
    }

    pub fn into_report(self) -> DrainReport {
        match self {
            Slice::Yielded(report) | Slice::Drained(report) => report,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkQueue
// ---------------------------------------------------------------------------

/// An ordered queue of pending nodes, head (next to run) to tail.
///
/// Inserting never executes anything; work runs only when the owner drains.
/// See [`crate::engine::QueueService`] for a queue that drains itself on the
/// local executor.
pub struct WorkQueue<C = ()> {
    pending: Pending<C>,
    /// Drain left open by a yielded [`WorkQueue::run_slice`].
    open: Option<OpenDrain>,
}

/// Span and running totals of a drain spread over several slices.
struct OpenDrain {
    span: tracing::Span,
    executed: usize,
    failed: usize,
}

impl OpenDrain {
    fn start() -> Self {
        Self {
            span: start_drain_span(&Uuid::new_v4()),
            executed: 0,
            failed: 0,
        }
    }
}

impl<C> Default for WorkQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> WorkQueue<C> {
    pub fn new() -> Self {
        Self {
            pending: Pending {
                nodes: VecDeque::new(),
                journal: None,
            },
            open: None,
        }
    }

    /// Create a queue that keeps the last `capacity` events.
    pub fn with_journal(capacity: usize) -> Self {
        let mut queue = Self::new();
        if capacity > 0 {
            queue.pending.journal = Some(Journal::new(capacity));
        }
        queue
    }

    pub fn append(&mut self, node: impl Node<C> + 'static) {
        self.insert(Box::new(node), Placement::Tail);
    }

    pub fn prepend(&mut self, node: impl Node<C> + 'static) {
        self.insert(Box::new(node), Placement::Head);
    }

    pub fn append_fn<F>(&mut self, description: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Context<'_, C>) -> std::result::Result<(), NodeError> + 'static,
    {
        self.append(FnNode::new(description, f));
    }

    pub fn prepend_fn<F>(&mut self, description: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Context<'_, C>) -> std::result::Result<(), NodeError> + 'static,
    {
        self.prepend(FnNode::new(description, f));
    }

    /// Insert an already boxed node.
    pub fn insert(&mut self, node: Box<dyn Node<C>>, placement: Placement) {
        self.pending.insert(node, placement);
    }

    pub fn len(&self) -> usize {
        self.pending.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.nodes.is_empty()
    }

    /// Label of the node that would run next.
    pub fn peek_description(&self) -> Option<&str> {
        self.pending.nodes.front().map(|node| node.description())
    }

    /// Labels of all pending nodes, head to tail.
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.pending.nodes.iter().map(|node| node.description())
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.pending.journal.as_ref()
    }

    /// Remove and return all journaled events. Empty without a journal.
    pub fn take_events(&mut self) -> Vec<QueueEvent> {
        self.pending
            .journal
            .as_mut()
            .map(Journal::take)
            .unwrap_or_default()
    }

    /// Drop every pending node without running it.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.nodes.len();
        self.pending.nodes.clear();
        dropped
    }

    /// Run the head node. `None` if the queue is empty.
    ///
    /// A failure is returned here, but the node is consumed either way.
    pub fn process_next(&mut self, state: &mut C) -> Option<Result<()>> {
        let node = self.pending.nodes.pop_front()?;
        Some(self.execute(node, state).map_err(Error::from))
    }

    /// Run until empty without yielding.
    pub fn drain(&mut self, state: &mut C) -> DrainReport {
        let span = start_drain_span(&Uuid::new_v4());
        let _enter = span.enter();

        let mut budget = YieldPolicy::Never.budget();
        let mut report = DrainReport::default();
        loop {
            match self.slice(state, &mut budget) {
                Slice::Drained(r) => {
                    report.merge(r);
                    break;
                }
                Slice::Yielded(r) => report.merge(r),
            }
        }

        self.finish_drain(&span, report.executed, report.failures.len());
        report
    }

    /// Run until `yield_point` asks for control back or the queue empties.
    ///
    /// Call again to resume; ordering is unaffected by where slices end. All
    /// slices up to the one that empties the queue belong to one drain, and
    /// its totals are recorded once, when that last slice returns. Calling
    /// this on an empty queue with no drain in progress records nothing.
    pub fn run_slice(&mut self, state: &mut C, yield_point: &mut impl YieldPoint) -> Slice {
        if self.open.is_none() && self.is_empty() {
            return Slice::Drained(DrainReport::default());
        }

        let mut open = self.open.take().unwrap_or_else(OpenDrain::start);
        let slice = {
            let _enter = open.span.enter();
            self.slice(state, yield_point)
        };
        open.executed += slice.report().executed;
        open.failed += slice.report().failures.len();

        if slice.is_drained() {
            self.finish_drain(&open.span, open.executed, open.failed);
        } else {
            self.open = Some(open);
        }
        slice
    }

    /// Run until empty, awaiting [`tokio::task::yield_now`] wherever
    /// `yield_point` asks.
    pub async fn drain_cooperative(
        &mut self,
        state: &mut C,
        yield_point: &mut impl YieldPoint,
    ) -> DrainReport {
        let span = start_drain_span(&Uuid::new_v4());

        async {
            let mut report = DrainReport::default();
            loop {
                match self.slice(state, yield_point) {
                    Slice::Drained(r) => {
                        report.merge(r);
                        break;
                    }
                    Slice::Yielded(r) => {
                        report.merge(r);
                        tokio::task::yield_now().await;
                    }
                }
            }
            self.finish_drain(&span, report.executed, report.failures.len());
            report
        }
        .instrument(span.clone())
        .await
    }

    fn slice(&mut self, state: &mut C, yield_point: &mut impl YieldPoint) -> Slice {
        let mut report = DrainReport::default();
        yield_point.start();

        while let Some(node) = self.pending.nodes.pop_front() {
            report.executed += 1;
            if let Err(failure) = self.execute(node, state) {
                report.failures.push(failure);
            }

            if yield_point.should_yield() && !self.is_empty() {
                debug!(
                    executed = report.executed,
                    pending = self.len(),
                    "yielding"
                );
                metrics::drain_yields().add(1, &[]);
                self.pending.record(EventKind::SliceYielded {
                    executed: report.executed,
                });
                return Slice::Yielded(report);
            }
        }

        Slice::Drained(report)
    }

    fn execute(
        &mut self,
        node: BoxNode<C>,
        state: &mut C,
    ) -> std::result::Result<(), NodeFailure> {
        let description = node.description().to_string();
        let span = start_node_span(&description);
        let _enter = span.enter();

        let started = Instant::now();
        let outcome = {
            let mut cx = Context {
                pending: &mut self.pending,
                state,
            };
            panic::catch_unwind(AssertUnwindSafe(|| node.execute(&mut cx)))
                .unwrap_or_else(|payload| Err(NodeError::from_panic(payload)))
        };
        let elapsed = started.elapsed();

        metrics::node_duration_ms().record(elapsed.as_secs_f64() * 1000.0, &[]);

        match outcome {
            Ok(()) => {
                metrics::nodes_executed().add(1, &[KeyValue::new("result", "ok")]);
                self.pending.record(EventKind::NodeCompleted {
                    description,
                    duration_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                });
                Ok(())
            }
            Err(error) => {
                error!(node = %description, %error, "node failed");
                metrics::nodes_executed().add(1, &[KeyValue::new("result", "error")]);
                self.pending.record(EventKind::NodeFailed {
                    description: description.clone(),
                    error: error.to_string(),
                });
                Err(NodeFailure { description, error })
            }
        }
    }

    fn finish_drain(&mut self, span: &tracing::Span, executed: usize, failed: usize) {
        record_drain_totals(span, executed, failed);
        self.pending.record(EventKind::DrainCompleted { executed, failed });
    }
}

impl<C> std::fmt::Debug for WorkQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("pending", &self.descriptions().collect::<Vec<_>>())
            .field("journal", &self.pending.journal.as_ref().map(Journal::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_drops_without_running() {
        let mut queue: WorkQueue<u32> = WorkQueue::new();
        queue.append_fn("a", |cx| {
            *cx.state() += 1;
            Ok(())
        });
        queue.append_fn("b", |cx| {
            *cx.state() += 1;
            Ok(())
        });

        assert_eq!(queue.clear(), 2);

        let mut runs = 0;
        let report = queue.drain(&mut runs);
        assert_eq!(report.executed, 0);
        assert_eq!(runs, 0);
    }

    #[test]
    fn debug_lists_pending_head_to_tail() {
        let mut queue: WorkQueue = WorkQueue::new();
        queue.append_fn("second", |_| Ok(()));
        queue.prepend_fn("first", |_| Ok(()));

        let debug = format!("{queue:?}");
        assert!(debug.contains(r#"["first", "second"]"#), "{debug}");
    }
}
