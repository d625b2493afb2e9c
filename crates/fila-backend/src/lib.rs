//! # fila-backend
//!
//! Implementations of the work-order queue contract: the
//! [`QueueBackend`] trait itself, the [`RemoteBackend`] HTTP client,
//! and the [`SimulatorBackend`] lifecycle simulator that stands in for
//! the remote job-processing service when no live session exists.

pub mod contract;
pub mod remote;
pub mod sim;

pub use contract::{BackendKind, QueueBackend};
pub use remote::RemoteBackend;
pub use sim::SimulatorBackend;
