//! Wire-level message and registry types shared by every role crate:
//! the `/shared_state/*` JSON records, the registration/disconnect
//! request-reply bodies, and the sliding-history event shapes. Kept
//! dependency-light (just `primitives` + `serde`): a pure data-shape
//! crate with no transport or coordination logic of its own.

mod history;
mod protocol;
mod registry;

pub use history::{select_tail, EventRecord, ReceivedRecord, SlidingHistory};
pub use protocol::{
    DisconnectBody, DisconnectRequest, DisconnectResponse, NewPublisherNotification, NotifyPort,
    PublisherRegistrationRequest, RegisterPubBody, RegisterPublisherRequest,
    RegisterPublisherResponse, RegisterSubscriberRequest, RegisterSubscriberResponse,
    SubscriberRegistrationRequest,
};
pub use registry::{PublisherRecord, SubscriberRecord};
