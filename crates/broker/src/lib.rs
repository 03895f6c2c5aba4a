//! The per-zone broker: contends for its zone's primary election,
//! matchmakes publishers against subscribers by dominance, and either
//! forwards every message itself (centralized mode) or gossips addresses
//! so clients talk to each other directly (decentralized mode).

mod broker;
mod dissemination;
mod error;
mod load;
mod state;

pub use broker::Broker;
pub use error::{Error, Result};
pub use load::{update_current_load, CURRENT_LOAD_PATH};
pub use state::Registry;
