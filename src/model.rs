//! Core data model.
//!
//! A node is something that needs doing. It has a label for diagnostics and an
//! action that runs exactly once. The queue never looks past those two things.

use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::queue::Context;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A unit of deferred work.
///
/// `C` is the caller-owned state threaded through every execution (shared
/// counters, accumulators, builders). Nodes that need nothing use `()`.
///
/// `execute` consumes the node: once dequeued it can never run again. To run
/// the same work twice, insert two values (e.g. clones).
pub trait Node<C> {
    /// Perform the work. May insert further nodes through `cx`.
    fn execute(self: Box<Self>, cx: &mut Context<'_, C>) -> Result<(), NodeError>;

    /// Human-readable label. Has no effect on scheduling.
    fn description(&self) -> &str;
}

/// A closure plus a label.
pub struct FnNode<F> {
    description: String,
    f: F,
}

impl<F> FnNode<F> {
    pub fn new(description: impl Into<String>, f: F) -> Self {
        Self {
            description: description.into(),
            f,
        }
    }
}

impl<C, F> Node<C> for FnNode<F>
where
    F: FnOnce(&mut Context<'_, C>) -> Result<(), NodeError>,
{
    fn execute(self: Box<Self>, cx: &mut Context<'_, C>) -> Result<(), NodeError> {
        (self.f)(cx)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<F> std::fmt::Debug for FnNode<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNode")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Which end of the queue a node was inserted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Ahead of everything currently queued.
    Head,
    /// Behind everything currently queued.
    Tail,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::Head => "head",
            Placement::Tail => "tail",
        }
    }
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
