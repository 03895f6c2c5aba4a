//! A publishing client: picks a zone, registers with its primary, and
//! emits topic-tagged events carrying its sliding-history buffer.

mod error;
mod publisher;
mod zone;

pub use error::{Error, Result};
pub use publisher::Publisher;
pub use zone::{pick_zone, read_primary};
