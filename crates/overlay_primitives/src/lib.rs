//! Shared, dependency-light types used across every overlay crate: ids,
//! topics, zone numbers and the handful of environment helpers every
//! role's `telemetry` bootstrap needs.

mod address;
mod environment;
mod ids;

pub use address::*;
pub use environment::*;
pub use ids::*;

/// The number of most-recent events a publisher keeps (its `offered` size)
/// or a subscriber wants delivered (its `requested` size).
pub type HistorySize = usize;
