//! The transport layer every role crate in this workspace builds on: a
//! length-delimited framed TCP connection (`framing`), a one-shot
//! request/reply call built on top of it (`request_reply`), a
//! publish/subscribe fan-out pair (`pubsub`), a single-connection
//! send-then-await-ack channel for decentralized notifications
//! (`notify`), and the random high-port allocator brokers use for
//! per-topic sockets (`port_pool`).
//!
//! No ZeroMQ-alike dependency is grounded anywhere in this workspace's
//! tree, so the REQ/REP and PUB/SUB *patterns* the rest of the system is
//! specified against are realized directly on `tokio`'s TCP primitives
//! plus `tokio-util`'s length-delimited codec, the same pairing this
//! codebase reaches for elsewhere it frames messages over a raw stream.

mod error;
mod framing;
mod notify;
mod port_pool;
mod pubsub;
mod request_reply;

pub use error::{Error, Result};
pub use framing::FrameStream;
pub use notify::{NotifyClient, NotifyEndpoint};
pub use port_pool::{PortPool, RANGE_END, RANGE_START};
pub use pubsub::{PublishEndpoint, SubscribeEndpoint};
pub use request_reply::{call, PendingRequest, ReplyServer};
