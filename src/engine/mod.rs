//! Self-draining queue service: insertions wake a drain loop that runs on the
//! local executor and yields between slices.

pub mod control;

pub use control::{QueueService, ServiceConfig};
