//! A hierarchical coordination service client, abstracted behind
//! [`CoordinationClient`] the way every other dependency this workspace
//! talks to over the network is abstracted behind a trait at its seam.
//!
//! No registry crate for a ZooKeeper-alike binding is grounded anywhere in
//! this workspace's dependency tree, so the only implementation shipped
//! here is [`memory::InMemoryCoordinationClient`] — a fully functional,
//! in-process tree used by every role crate and all of their tests. A real
//! network-backed implementation is a matter of implementing the trait
//! against whatever coordination service a deployment settles on; it is
//! not faked here with a stub dependency.

mod client;
mod election;
mod error;
mod memory;

pub use client::{ConnectionState, CoordinationClient, CreateMode};
pub use election::{campaign, LeadershipHandle};
pub use error::{Error, Result};
pub use memory::InMemoryCoordinationClient;
