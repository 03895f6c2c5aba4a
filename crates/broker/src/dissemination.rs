use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
};

use bytes::Bytes;
use events::NewPublisherNotification;
use primitives::{ClientId, Topic};
use telemetry::{debug, warn};
use wire::{NotifyEndpoint, PortPool, PublishEndpoint, SubscribeEndpoint};

use crate::{Error, Result};

/// The broker's dissemination-mode-specific state. A broker is either
/// centralized (it forwards every publisher's stream itself) or
/// decentralized (it only matchmakes and gossips addresses); it is never
/// both, fixed for the process's lifetime by [`overlay_config::BrokerConfig::centralized`].
pub enum Dissemination {
    Centralized(Centralized),
    Decentralized(Decentralized),
}

impl Dissemination {
    pub fn new(centralized: bool, host: IpAddr) -> Self {
        if centralized {
            Self::Centralized(Centralized::new(host))
        } else {
            Self::Decentralized(Decentralized::new(host))
        }
    }
}

/// One broker-bound publish endpoint per topic, fed by one forwarding task
/// per publisher connection (a publisher multiplexes every topic it offers
/// over its single bind endpoint, so one TCP connection suffices) that
/// reads each message's real topic frame and relays it unmodified onto
/// that topic's send endpoint. Dominance matchmaking is deliberately not
/// applied to this relay.
pub struct Centralized {
    host: IpAddr,
    ports: PortPool,
    send_endpoints: HashMap<Topic, PublishEndpoint>,
    forwarders: HashMap<ClientId, tokio::task::JoinHandle<()>>,
}

impl Centralized {
    fn new(host: IpAddr) -> Self {
        Self {
            host,
            ports: PortPool::new(),
            send_endpoints: HashMap::new(),
            forwarders: HashMap::new(),
        }
    }

    /// Ensures a send endpoint exists for `topic`, returning its port.
    pub async fn ensure_send_endpoint(&mut self, topic: &Topic) -> Result<u16> {
        if let Some(endpoint) = self.send_endpoints.get(topic) {
            return Ok(endpoint.port());
        }

        let endpoint = self.bind_random_port().await?;
        let port = endpoint.port();
        self.send_endpoints.insert(topic.clone(), endpoint);
        Ok(port)
    }

    async fn bind_random_port(&mut self) -> Result<PublishEndpoint> {
        for _ in 0..32 {
            let Some(candidate) = self.ports.allocate() else {
                break;
            };
            match PublishEndpoint::bind(self.host, candidate, 1).await {
                Ok(endpoint) => return Ok(endpoint),
                Err(_) => {
                    self.ports.release(candidate);
                    continue;
                }
            }
        }
        Err(Error::NoPortAvailable)
    }

    /// Opens a single receive subscription to `publisher_addr` covering
    /// every topic in `topics`, if one isn't already running for this
    /// publisher. The forwarding task demultiplexes by the real topic
    /// frame each message carries and relays onto that topic's own send
    /// endpoint, creating send endpoints for all of `topics` up front.
    pub async fn ensure_receive_subscription(
        &mut self,
        topics: &[Topic],
        publisher_id: &ClientId,
        publisher_addr: SocketAddr,
    ) -> Result<()> {
        if self.forwarders.contains_key(publisher_id) {
            return Ok(());
        }

        let mut routes: HashMap<Bytes, PublishEndpoint> = HashMap::new();
        for topic in topics {
            self.ensure_send_endpoint(topic).await?;
            if let Some(endpoint) = self.send_endpoints.get(topic) {
                routes.insert(Bytes::copy_from_slice(topic.as_str().as_bytes()), endpoint.clone());
            }
        }

        let mut subscribe = match SubscribeEndpoint::connect(publisher_addr).await {
            Ok(subscribe) => subscribe,
            Err(err) => {
                warn!(%err, %publisher_addr, "could not open receive subscription to publisher");
                return Ok(());
            }
        };

        let handle = tokio::spawn(async move {
            loop {
                match subscribe.recv().await {
                    Ok((topic, payload)) => {
                        if let Some(endpoint) = routes.get(&topic) {
                            endpoint.publish(topic, payload);
                        }
                    }
                    Err(_) => return,
                }
            }
        });

        self.forwarders.insert(publisher_id.clone(), handle);
        Ok(())
    }

    pub fn remove_receive_subscription(&mut self, publisher_id: &ClientId) {
        if let Some(handle) = self.forwarders.remove(publisher_id) {
            handle.abort();
        }
    }

    pub fn close_topic_if_unused(&mut self, topic: &Topic, still_has_publishers: bool) {
        if !still_has_publishers {
            self.send_endpoints.remove(topic);
        }
    }
}

/// Decentralized mode: one notify endpoint per subscriber. Every push
/// is a request/ack round trip, mirroring the original's bound `REQ`
/// socket blocking on `recv_string()` for the subscriber's confirmation.
pub struct Decentralized {
    host: IpAddr,
    ports: PortPool,
    notify_endpoints: HashMap<ClientId, NotifyEndpoint>,
}

impl Decentralized {
    fn new(host: IpAddr) -> Self {
        Self {
            host,
            ports: PortPool::new(),
            notify_endpoints: HashMap::new(),
        }
    }

    pub async fn ensure_notify_endpoint(&mut self, subscriber_id: &ClientId) -> Result<u16> {
        if let Some(endpoint) = self.notify_endpoints.get(subscriber_id) {
            return Ok(endpoint.port());
        }

        for _ in 0..32 {
            let Some(candidate) = self.ports.allocate() else {
                break;
            };
            match NotifyEndpoint::bind(self.host, candidate, 1).await {
                Ok(endpoint) => {
                    let port = endpoint.port();
                    self.notify_endpoints.insert(subscriber_id.clone(), endpoint);
                    return Ok(port);
                }
                Err(_) => self.ports.release(candidate),
            }
        }
        Err(Error::NoPortAvailable)
    }

    /// Pushes the new-publisher notification array to `subscriber_id`'s
    /// notify endpoint and blocks for its acknowledgement string.
    /// Missing endpoints (subscriber hasn't finished registering, or
    /// already disconnected) are not treated as an error; neither is a
    /// subscriber that never acknowledges, beyond logging it.
    pub async fn notify(&self, subscriber_id: &ClientId, notifications: &[NewPublisherNotification]) {
        let Some(endpoint) = self.notify_endpoints.get(subscriber_id) else {
            debug!(%subscriber_id, "no notify endpoint open yet, dropping notification");
            return;
        };

        let payload = match serde_json::to_vec(notifications) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, %subscriber_id, "failed to encode new-publisher notification");
                return;
            }
        };

        match endpoint.notify(Bytes::from(payload)).await {
            Ok(ack) => debug!(%subscriber_id, %ack, "subscriber acknowledged new-publisher notification"),
            Err(err) => warn!(%err, %subscriber_id, "subscriber did not acknowledge new-publisher notification"),
        }
    }

    pub fn remove_notify_endpoint(&mut self, subscriber_id: &ClientId) {
        self.notify_endpoints.remove(subscriber_id);
    }
}
