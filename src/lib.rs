//! # workq
//!
//! A cooperative, single-threaded work queue.
//!
//! Nodes are inserted at the head or tail of a [`WorkQueue`] and drained one
//! at a time, head first. A drain may run to empty or hand control back to
//! its host at configurable yield points; either way the order is the same.
//! [`engine::QueueService`] wraps a queue in a drain loop that runs on a tokio
//! `LocalSet`, so inserted work drains without the caller polling.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod queue;
pub mod schedule;
pub mod telemetry;

pub use error::{Error, NodeError, Result};
pub use model::{FnNode, Node, Placement};
pub use queue::{Context, DrainReport, NodeFailure, Slice, WorkQueue};
pub use schedule::{Budget, YieldPoint, YieldPolicy};
