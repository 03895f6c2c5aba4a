//! A subscribing client: picks a zone, registers its topic interests with
//! its primary, then either connects directly to publishers
//! (decentralized) or to the broker's per-topic forwarding sockets
//! (centralized), recording delivery latency for every event received.

mod error;
mod subscriber;
mod zone;

pub use error::{Error, Result};
pub use subscriber::Subscriber;
pub use zone::{pick_zone, read_primary};
