//! Yield points: when a drain hands control back to its host.
//!
//! The drain loop consults a [`YieldPoint`] after every executed node. What it
//! answers changes *when* the host regains control, never the order in which
//! nodes run.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hook consulted by the drain loop.
pub trait YieldPoint {
    /// Called at the beginning of every slice.
    fn start(&mut self);

    /// Called after each executed node, failed ones included.
    fn should_yield(&mut self) -> bool;
}

/// Owner-selected yield behavior, loadable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum YieldPolicy {
    /// Run to empty without suspending.
    Never,
    /// Suspend after every node.
    #[default]
    EveryNode,
    /// Suspend after this many nodes.
    Batch(NonZeroUsize),
    /// Suspend once a slice has run for at least this long.
    TimeSlice(Duration),
}

impl YieldPolicy {
    /// Fresh per-drain state for this policy.
    pub fn budget(self) -> Budget {
        Budget {
            policy: self,
            executed: 0,
            started: Instant::now(),
        }
    }
}

impl FromStr for YieldPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "never" => return Ok(YieldPolicy::Never),
            "every-node" => return Ok(YieldPolicy::EveryNode),
            _ => {}
        }

        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("unknown yield policy: {s}")))?;
        let n: u64 = value
            .parse()
            .map_err(|_| Error::Config(format!("invalid number in yield policy: {s}")))?;

        match kind {
            "batch" => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(YieldPolicy::Batch)
                .ok_or_else(|| Error::Config(format!("batch size must be at least 1: {s}"))),
            "slice" => Ok(YieldPolicy::TimeSlice(Duration::from_millis(n))),
            _ => Err(Error::Config(format!("unknown yield policy: {s}"))),
        }
    }
}

impl std::fmt::Display for YieldPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YieldPolicy::Never => f.write_str("never"),
            YieldPolicy::EveryNode => f.write_str("every-node"),
            YieldPolicy::Batch(n) => write!(f, "batch:{n}"),
            YieldPolicy::TimeSlice(d) => write!(f, "slice:{}", d.as_millis()),
        }
    }
}

impl TryFrom<String> for YieldPolicy {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<YieldPolicy> for String {
    fn from(policy: YieldPolicy) -> Self {
        policy.to_string()
    }
}

/// Running state of a [`YieldPolicy`] within one slice.
#[derive(Debug, Clone)]
pub struct Budget {
    policy: YieldPolicy,
    executed: usize,
    started: Instant,
}

impl YieldPoint for Budget {
    fn start(&mut self) {
        self.executed = 0;
        self.started = Instant::now();
    }

    fn should_yield(&mut self) -> bool {
        self.executed += 1;
        match self.policy {
            YieldPolicy::Never => false,
            YieldPolicy::EveryNode => true,
            YieldPolicy::Batch(n) => self.executed >= n.get(),
            YieldPolicy::TimeSlice(limit) => self.started.elapsed() >= limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_yields_after_n_nodes() {
        let mut budget = YieldPolicy::Batch(NonZeroUsize::new(3).unwrap()).budget();
        budget.start();
        assert!(!budget.should_yield());
        assert!(!budget.should_yield());
        assert!(budget.should_yield());

        budget.start();
        assert!(!budget.should_yield());
    }

    #[test]
    fn never_does_not_yield() {
        let mut budget = YieldPolicy::Never.budget();
        budget.start();
        for _ in 0..1000 {
            assert!(!budget.should_yield());
        }
    }

    #[test]
    fn zero_length_slice_yields_immediately() {
        let mut budget = YieldPolicy::TimeSlice(Duration::ZERO).budget();
        budget.start();
        assert!(budget.should_yield());
    }
}
