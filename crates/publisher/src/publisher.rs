use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use coordination::CoordinationClient;
use events::{
    DisconnectBody, DisconnectRequest, DisconnectResponse, EventRecord, RegisterPublisherRequest,
    RegisterPublisherResponse, SlidingHistory,
};
use overlay_config::PublisherConfig;
use primitives::{local_ip_address, ClientId, PrimaryEndpoint, Topic};
use telemetry::{debug, info, warn};
use wire::PublishEndpoint;

use crate::{
    zone::{pick_zone, read_primary},
    Error, Result,
};

const PORT_BIND_ATTEMPTS: u16 = 16;

/// One publishing client: binds its own publish endpoint, registers with
/// its zone's primary, and emits topic-tagged events carrying its full
/// sliding-history buffer on every message.
pub struct Publisher<C: CoordinationClient> {
    id: ClientId,
    config: PublisherConfig,
    coordination: Arc<C>,
    history: SlidingHistory,
}

impl<C: CoordinationClient + 'static> Publisher<C> {
    pub fn new(config: PublisherConfig, coordination: Arc<C>) -> Self {
        let history = SlidingHistory::new(config.offered);
        Self {
            id: ClientId::new(),
            config,
            coordination,
            history,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub async fn run(mut self) -> Result<()> {
        let zone = pick_zone(&*self.coordination).await?;
        info!(publisher_id = %self.id, %zone, "publisher assigned to zone");

        let endpoint = PublishEndpoint::bind(local_ip_address(), self.config.bind_port, PORT_BIND_ATTEMPTS)
            .await?;
        let address = format!("{}:{}", local_ip_address(), endpoint.port());

        let mut primary = read_primary(&*self.coordination, zone).await?;
        self.register(&primary, &address).await?;

        let mut watch = self.coordination.watch_data(&zone.primary_path()).await?;
        let mut iteration = 0usize;
        let mut switching = false;

        let outcome: Result<()> = loop {
            if !self.config.indefinite && iteration >= self.config.max_event_count {
                break Ok(());
            }

            tokio::select! {
                biased;

                _ = tokio::time::sleep(self.config.sleep_period), if !switching => {
                    let topic = self.config.topics[iteration % self.config.topics.len()].clone();
                    self.emit(&endpoint, &address, &topic);
                    iteration += 1;
                }

                changed = watch.changed() => {
                    if changed.is_err() {
                        break Err(Error::Coordination(coordination::Error::SessionLost));
                    }

                    switching = true;
                    info!(publisher_id = %self.id, %zone, "primary changed, reconfiguring");

                    match read_primary(&*self.coordination, zone).await {
                        Ok(new_primary) => {
                            primary = new_primary;
                            if let Err(err) = self.register(&primary, &address).await {
                                warn!(%err, "re-registration with new primary failed");
                            }
                        }
                        Err(err) => warn!(%err, "failed to read new primary node"),
                    }

                    switching = false;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!(publisher_id = %self.id, "shutdown signal received");
                    break Ok(());
                }
            }
        };

        let _ = self.disconnect(&primary, &address).await;
        outcome
    }

    fn emit(&mut self, endpoint: &PublishEndpoint, address: &str, topic: &Topic) {
        self.history.push(EventRecord {
            publisher: address.to_string(),
            topic: topic.clone(),
            publish_time: now_seconds(),
        });

        let Ok(payload) = serde_json::to_vec(&self.history.as_slice()) else {
            return;
        };

        debug!(publisher_id = %self.id, %topic, history_len = self.history.len(), "publishing event");
        endpoint.publish(
            Bytes::copy_from_slice(topic.as_str().as_bytes()),
            Bytes::from(payload),
        );
    }

    async fn register(&self, primary: &PrimaryEndpoint, address: &str) -> Result<()> {
        let request = RegisterPublisherRequest {
            address: address.to_string(),
            topics: self.config.topics.clone(),
            offered: self.config.offered,
            id: self.id.clone(),
        };

        let response: RegisterPublisherResponse = wire::call(primary.pub_reg_addr(), &request).await?;
        match response {
            RegisterPublisherResponse::Success { .. } => {
                info!(publisher_id = %self.id, %address, "registered with primary");
                Ok(())
            }
            RegisterPublisherResponse::Error { error } => Err(Error::RegistrationRejected(error)),
        }
    }

    async fn disconnect(&self, primary: &PrimaryEndpoint, address: &str) -> Result<()> {
        let request = DisconnectRequest {
            disconnect: DisconnectBody {
                id: self.id.clone(),
                address: address.to_string(),
                topics: self.config.topics.clone(),
                notify_port: None,
            },
        };

        let _: DisconnectResponse = wire::call(primary.pub_reg_addr(), &request).await?;
        info!(publisher_id = %self.id, "disconnected from primary");
        Ok(())
    }
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use wire::ReplyServer;

    use super::*;

    fn loopback_endpoint(pub_reg_port: u16) -> PrimaryEndpoint {
        PrimaryEndpoint {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            pub_reg_port,
            sub_reg_port: 0,
        }
    }

    #[tokio::test]
    async fn register_succeeds_against_a_server_that_accepts() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let server = ReplyServer::bind(loopback, 0, 1).await.unwrap();
        let primary = loopback_endpoint(server.port());

        let server_task = tokio::spawn(async move {
            let request = server.accept_one::<RegisterPublisherRequest>().await.unwrap();
            request.reply(&RegisterPublisherResponse::ok()).await.unwrap();
        });

        let publisher = Publisher::new(
            PublisherConfig {
                topics: vec![Topic::from("A")],
                offered: 2,
                ..Default::default()
            },
            Arc::new(coordination::InMemoryCoordinationClient::new()),
        );

        publisher.register(&primary, "127.0.0.1:9000").await.unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn register_surfaces_a_rejection() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let server = ReplyServer::bind(loopback, 0, 1).await.unwrap();
        let primary = loopback_endpoint(server.port());

        let server_task = tokio::spawn(async move {
            let request = server.accept_one::<RegisterPublisherRequest>().await.unwrap();
            request
                .reply(&RegisterPublisherResponse::error("malformed topic list"))
                .await
                .unwrap();
        });

        let publisher = Publisher::new(
            PublisherConfig::default(),
            Arc::new(coordination::InMemoryCoordinationClient::new()),
        );

        let err = publisher.register(&primary, "127.0.0.1:9000").await.unwrap_err();
        assert!(matches!(err, Error::RegistrationRejected(_)));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn emit_keeps_the_history_bounded_to_offered() {
        let mut publisher = Publisher::new(
            PublisherConfig {
                offered: 2,
                ..Default::default()
            },
            Arc::new(coordination::InMemoryCoordinationClient::new()),
        );
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let endpoint = PublishEndpoint::bind(loopback, 0, 1).await.unwrap();
        let topic = Topic::from("A");

        publisher.emit(&endpoint, "127.0.0.1:9000", &topic);
        publisher.emit(&endpoint, "127.0.0.1:9000", &topic);
        publisher.emit(&endpoint, "127.0.0.1:9000", &topic);

        assert_eq!(publisher.history.len(), 2);
    }
}
