//! Drain loop: waits for work, drains it slice by slice, yields in between.
//!
//! A [`QueueService`] is a cheap handle. Clones share one queue, one state
//! value, and one drain loop. Inserting through the handle never runs work
//! inline; it wakes [`QueueService::run`], which must be polled on the same
//! thread (typically via [`QueueService::spawn`] inside a tokio `LocalSet`).
//!
//! While a node executes, the service's queue and state are borrowed. Nodes
//! insert follow-up work through their [`Context`](crate::queue::Context), not
//! through a captured handle. Inserting through the handle from inside
//! `execute` hits the held borrow and panics; the drain catches that panic like
//! any other, so the node is reported as failed and the insert never happens.
//! [`QueueService::shutdown`] is safe to call from anywhere.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{NodeError, Result};
use crate::event::QueueEvent;
use crate::model::Node;
use crate::queue::{Context, NodeFailure, WorkQueue};
use crate::schedule::{YieldPoint, YieldPolicy};

/// Configuration for a queue service.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub yield_policy: YieldPolicy,
    /// Events kept by the underlying queue. 0 disables the journal.
    pub journal_capacity: usize,
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            yield_policy: config.yield_policy,
            journal_capacity: config.journal_capacity,
        }
    }
}

type FailureHandler = Box<dyn FnMut(&NodeFailure)>;

struct Shared<C> {
    queue: RefCell<WorkQueue<C>>,
    state: RefCell<C>,
    config: ServiceConfig,
    /// Work was inserted.
    ready: Notify,
    /// A drain finished or the service stopped.
    idle: Notify,
    shutdown: Notify,
    stopping: Cell<bool>,
    draining: Cell<bool>,
    executed: Cell<u64>,
    failures: RefCell<Vec<NodeFailure>>,
    on_failure: RefCell<Option<FailureHandler>>,
}

/// Handle to a self-draining work queue.
pub struct QueueService<C> {
    shared: Rc<Shared<C>>,
}

impl<C> Clone for QueueService<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C> QueueService<C> {
    pub fn new(state: C, config: ServiceConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                queue: RefCell::new(WorkQueue::with_journal(config.journal_capacity)),
                state: RefCell::new(state),
                config,
                ready: Notify::new(),
                idle: Notify::new(),
                shutdown: Notify::new(),
                stopping: Cell::new(false),
                draining: Cell::new(false),
                executed: Cell::new(0),
                failures: RefCell::new(Vec::new()),
                on_failure: RefCell::new(None),
            }),
        }
    }

    /// Call `handler` for every failed node.
    ///
    /// While a handler is installed, failures go to it instead of being
    /// collected for [`take_failures`](Self::take_failures).
    pub fn on_failure(&self, handler: impl FnMut(&NodeFailure) + 'static) {
        *self.shared.on_failure.borrow_mut() = Some(Box::new(handler));
    }

    pub fn append(&self, node: impl Node<C> + 'static) {
        self.shared.queue.borrow_mut().append(node);
        self.shared.ready.notify_one();
    }

    pub fn prepend(&self, node: impl Node<C> + 'static) {
        self.shared.queue.borrow_mut().prepend(node);
        self.shared.ready.notify_one();
    }

    pub fn append_fn<F>(&self, description: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Context<'_, C>) -> std::result::Result<(), NodeError> + 'static,
    {
        self.shared.queue.borrow_mut().append_fn(description, f);
        self.shared.ready.notify_one();
    }

    pub fn prepend_fn<F>(&self, description: impl Into<String>, f: F)
    where
        F: FnOnce(&mut Context<'_, C>) -> std::result::Result<(), NodeError> + 'static,
    {
        self.shared.queue.borrow_mut().prepend_fn(description, f);
        self.shared.ready.notify_one();
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.borrow().len()
    }

    /// Labels of all pending nodes, head to tail.
    pub fn descriptions(&self) -> Vec<String> {
        self.shared
            .queue
            .borrow()
            .descriptions()
            .map(str::to_string)
            .collect()
    }

    /// No drain in progress and nothing pending, or the service has stopped.
    pub fn is_idle(&self) -> bool {
        self.shared.stopping.get() || (!self.shared.draining.get() && self.is_empty())
    }

    /// Total nodes executed by this service, failed ones included.
    pub fn executed(&self) -> u64 {
        self.shared.executed.get()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.shared.state.borrow())
    }

    pub fn with_state_mut<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.shared.state.borrow_mut())
    }

    /// Failures collected since the last call, while no
    /// [`on_failure`](Self::on_failure) handler was installed.
    pub fn take_failures(&self) -> Vec<NodeFailure> {
        std::mem::take(&mut *self.shared.failures.borrow_mut())
    }

    pub fn take_events(&self) -> Vec<QueueEvent> {
        self.shared.queue.borrow_mut().take_events()
    }

    /// Stop the drain loop after the node currently executing, if any.
    ///
    /// Pending nodes are abandoned. A stopped service does not restart.
    pub fn shutdown(&self) {
        self.shared.stopping.set(true);
        self.shared.shutdown.notify_one();
        self.shared.idle.notify_waiters();
    }

    /// Resolve once [`is_idle`](Self::is_idle) holds.
    ///
    /// Only makes progress while [`run`](Self::run) is being polled.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.shared.idle.notified();
            if self.is_idle() {
                return;
            }
            idle.await;
        }
    }

    /// Run the drain loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let shared = &self.shared;
        info!(yield_policy = %shared.config.yield_policy, "queue service started");

        let mut budget = shared.config.yield_policy.budget();
        loop {
            if shared.stopping.get() {
                break;
            }

            tokio::select! {
                biased;
                _ = shared.shutdown.notified() => break,
                _ = shared.ready.notified() => {}
            }

            if self.drain(&mut budget).await {
                break;
            }
        }

        info!(pending = self.len(), "queue service shutting down");
        shared.idle.notify_waiters();
        Ok(())
    }

    /// Drain until empty or stopped. Returns whether the service is stopping.
    async fn drain(&self, budget: &mut impl YieldPoint) -> bool {
        let shared = &self.shared;
        // A wake-up left over from an insert the previous drain already ran.
        if self.is_empty() {
            return shared.stopping.get();
        }
        shared.draining.set(true);

        let mut executed = 0;
        let mut failed = 0;
        let stopped = loop {
            let slice = {
                let mut queue = shared.queue.borrow_mut();
                let mut state = shared.state.borrow_mut();
                let mut yield_point = Stoppable {
                    inner: &mut *budget,
                    stopping: &shared.stopping,
                };
                queue.run_slice(&mut state, &mut yield_point)
            };

            let drained = slice.is_drained();
            let report = slice.into_report();
            executed += report.executed;
            failed += report.failures.len();
            shared
                .executed
                .set(shared.executed.get() + report.executed as u64);
            self.report_failures(report.failures);

            if shared.stopping.get() {
                break true;
            }
            if drained {
                break false;
            }
            tokio::task::yield_now().await;
        };

        debug!(executed, failed, "drain finished");
        shared.draining.set(false);
        shared.idle.notify_waiters();
        stopped
    }

    fn report_failures(&self, failures: Vec<NodeFailure>) {
        if failures.is_empty() {
            return;
        }
        match self.shared.on_failure.borrow_mut().as_mut() {
            Some(handler) => failures.iter().for_each(|failure| handler(failure)),
            None => self.shared.failures.borrow_mut().extend(failures),
        }
    }
}

impl<C: 'static> QueueService<C> {
    /// Spawn [`run`](Self::run) on the current `LocalSet`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a `LocalSet` context.
    pub fn spawn(&self) -> JoinHandle<Result<()>> {
        let service = self.clone();
        tokio::task::spawn_local(async move { service.run().await })
    }
}

impl<C> std::fmt::Debug for QueueService<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("config", &self.shared.config)
            .field("pending", &self.descriptions())
            .field("executed", &self.executed())
            .field("stopping", &self.shared.stopping.get())
            .finish()
    }
}

/// Yields as `inner` does, and always once a shutdown was requested.
struct Stoppable<'a, Y> {
    inner: &'a mut Y,
    stopping: &'a Cell<bool>,
}

impl<Y: YieldPoint> YieldPoint for Stoppable<'_, Y> {
    fn start(&mut self) {
        self.inner.start();
    }

    fn should_yield(&mut self) -> bool {
        self.inner.should_yield() || self.stopping.get()
    }
}
