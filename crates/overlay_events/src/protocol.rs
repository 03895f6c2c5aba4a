use std::collections::BTreeMap;

use primitives::{ClientId, HistorySize, Topic};
use serde::{Deserialize, Serialize};

/// `register_publisher` request body: `{"address":...,"topics":[...],"offered":N,"id":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPublisherRequest {
    pub address: String,
    pub topics: Vec<Topic>,
    pub offered: HistorySize,
    pub id: ClientId,
}

/// `{"success":"..."}` or `{"error":"<reason>"}`, the two shapes a
/// registration reply can take. Modeled `untagged` so neither variant
/// carries an extra wrapper key on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterPublisherResponse {
    Success { success: String },
    Error { error: String },
}

impl RegisterPublisherResponse {
    pub fn ok() -> Self {
        Self::Success {
            success: "registered".to_string(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            error: reason.into(),
        }
    }
}

/// `register_subscriber` request body, identical shape to the publisher's
/// except `requested` in place of `offered`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSubscriberRequest {
    pub address: String,
    pub topics: Vec<Topic>,
    pub requested: HistorySize,
    pub id: ClientId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyPort {
    pub notify_port: u16,
}

/// Decentralized mode replies `{"register_sub":{"notify_port":N}}`;
/// centralized mode replies a bare topic-to-port map `{"<topic>":N,...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterSubscriberResponse {
    Decentralized { register_sub: NotifyPort },
    Centralized(BTreeMap<String, u16>),
}

/// `{"disconnect":{"id":...,"address":...,"topics":[...],"notify_port":N?}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectRequest {
    pub disconnect: DisconnectBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectBody {
    pub id: ClientId,
    pub address: String,
    pub topics: Vec<Topic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_port: Option<u16>,
}

/// `{"disconnect":"success"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub disconnect: String,
}

impl DisconnectResponse {
    pub fn ok() -> Self {
        Self {
            disconnect: "success".to_string(),
        }
    }
}

/// One element of the decentralized new-publisher notification array:
/// `{"register_pub":{"addresses":["h:p",...],"topic":"T"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPublisherNotification {
    pub register_pub: RegisterPubBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPubBody {
    pub addresses: Vec<String>,
    pub topic: Topic,
}

/// What arrives on the broker's pub-reg socket: either a fresh
/// registration or a disconnect notice. Tried in this order so a
/// `{"disconnect": ...}` envelope, which would otherwise also satisfy a
/// permissive registration shape, is never misread as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublisherRegistrationRequest {
    Disconnect(DisconnectRequest),
    Register(RegisterPublisherRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriberRegistrationRequest {
    Disconnect(DisconnectRequest),
    Register(RegisterSubscriberRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_success_response_has_no_wrapper_key() {
        let response = RegisterPublisherResponse::ok();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], "registered");
    }

    #[test]
    fn subscriber_centralized_response_is_a_bare_topic_map() {
        let mut ports = BTreeMap::new();
        ports.insert("A".to_string(), 11000u16);
        let response = RegisterSubscriberResponse::Centralized(ports);

        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"A":11000}"#);
    }

    #[test]
    fn subscriber_decentralized_response_round_trips() {
        let response = RegisterSubscriberResponse::Decentralized {
            register_sub: NotifyPort { notify_port: 12345 },
        };
        let json = serde_json::to_string(&response).unwrap();
        let decoded: RegisterSubscriberResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn disconnect_request_matches_the_documented_shape() {
        let request = DisconnectRequest {
            disconnect: DisconnectBody {
                id: ClientId::from("sub-1".to_string()),
                address: "127.0.0.1:7000".to_string(),
                topics: vec![Topic::from("A")],
                notify_port: Some(12345),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["disconnect"]["notify_port"], 12345);
    }
}
