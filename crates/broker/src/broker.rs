use std::{collections::HashSet, sync::Arc, time::Duration};

use coordination::{campaign, CoordinationClient, ConnectionState, CreateMode};
use events::{
    DisconnectResponse, NewPublisherNotification, PublisherRecord, PublisherRegistrationRequest,
    RegisterPubBody, RegisterPublisherRequest, RegisterPublisherResponse,
    RegisterSubscriberRequest, RegisterSubscriberResponse, SubscriberRecord,
    SubscriberRegistrationRequest,
};
use overlay_config::BrokerConfig;
use primitives::{BrokerId, ClientId, PrimaryEndpoint, Topic, ZoneId};
use telemetry::{debug, error, info, warn};
use wire::{PendingRequest, ReplyServer};

use crate::{dissemination::Dissemination, load::update_current_load, state::Registry, Error, Result};

const PORT_BIND_ATTEMPTS: u16 = 16;

/// A single zone's broker process: contends for leadership, then serves
/// registrations until it loses its coordinator session, hits its
/// `autokill` deadline, or (test mode) exhausts `max_event_count`.
pub struct Broker<C: CoordinationClient> {
    id: BrokerId,
    config: BrokerConfig,
    coordination: Arc<C>,
    registry: Registry,
    dissemination: Dissemination,
}

impl<C: CoordinationClient + 'static> Broker<C> {
    pub fn new(config: BrokerConfig, coordination: Arc<C>) -> Self {
        let dissemination = Dissemination::new(config.centralized, config.host);
        Self {
            id: BrokerId::new(),
            config,
            coordination,
            registry: Registry::new(),
            dissemination,
        }
    }

    pub fn id(&self) -> &BrokerId {
        &self.id
    }

    /// Runs this broker to completion: contends for its zone's election,
    /// serves as primary once it wins, and returns when it steps down
    /// cleanly. A session loss while primary surfaces as `Err`.
    pub async fn run(mut self) -> Result<()> {
        let zone = self.config.zone;
        info!(broker_id = %self.id, %zone, "broker starting");

        self.coordination.ensure_path("/primaries").await?;
        self.coordination
            .ensure_path("/shared_state/publishers")
            .await?;
        self.coordination
            .ensure_path("/shared_state/subscribers")
            .await?;

        let mut pub_watch = self
            .coordination
            .watch_children("/shared_state/publishers")
            .await?;
        let mut sub_watch = self
            .coordination
            .watch_children("/shared_state/subscribers")
            .await?;

        let handle = campaign(
            &*self.coordination,
            &zone.election_path(),
            self.id.as_str().as_bytes().to_vec(),
        )
        .await?;

        handle.await_leadership(&*self.coordination).await?;
        info!(broker_id = %self.id, %zone, "won leadership");

        self.reconcile_publishers(pub_watch.borrow().clone()).await;
        self.reconcile_subscribers(sub_watch.borrow().clone()).await;

        let pub_reg = ReplyServer::bind(self.config.host, self.config.pub_reg_port, PORT_BIND_ATTEMPTS)
            .await?;
        let sub_reg = ReplyServer::bind(self.config.host, self.config.sub_reg_port, PORT_BIND_ATTEMPTS)
            .await?;

        let endpoint = PrimaryEndpoint {
            host: self.config.host,
            pub_reg_port: pub_reg.port(),
            sub_reg_port: sub_reg.port(),
        };
        self.publish_primary_node(zone, &endpoint).await?;
        update_current_load(
            &*self.coordination,
            self.registry.num_publishers(),
            self.registry.num_subscribers(),
        )
        .await?;

        let mut connection_state = self.coordination.connection_state();
        let autokill_deadline = self.config.autokill_secs.map(Duration::from_secs);
        let autokill = match autokill_deadline {
            Some(duration) => tokio::time::sleep(duration),
            None => tokio::time::sleep(Duration::from_secs(u64::MAX / 2)),
        };
        tokio::pin!(autokill);

        let mut events_handled = 0usize;

        let outcome = loop {
            if !self.config.indefinite && events_handled >= self.config.max_event_count {
                info!(broker_id = %self.id, "max_event_count reached, stepping down");
                break Ok(());
            }

            tokio::select! {
                biased;

                changed = connection_state.changed() => {
                    if changed.is_err() {
                        break Err(Error::SessionLost);
                    }
                    let state = *connection_state.borrow();
                    if matches!(state, ConnectionState::Lost | ConnectionState::Suspended) {
                        warn!(broker_id = %self.id, ?state, "coordinator session degraded while primary, stepping down");
                        break Err(Error::SessionLost);
                    }
                }

                request = pub_reg.accept_one::<PublisherRegistrationRequest>() => {
                    match request {
                        Ok(request) => {
                            self.handle_publisher_request(request).await;
                            events_handled += 1;
                        }
                        Err(err) => error!(%err, "pub-reg accept failed"),
                    }
                }

                request = sub_reg.accept_one::<SubscriberRegistrationRequest>() => {
                    match request {
                        Ok(request) => {
                            self.handle_subscriber_request(request).await;
                            events_handled += 1;
                        }
                        Err(err) => error!(%err, "sub-reg accept failed"),
                    }
                }

                changed = pub_watch.changed() => {
                    if changed.is_ok() {
                        let snapshot = pub_watch.borrow().clone();
                        self.reconcile_publishers(snapshot).await;
                    }
                }

                changed = sub_watch.changed() => {
                    if changed.is_ok() {
                        let snapshot = sub_watch.borrow().clone();
                        self.reconcile_subscribers(snapshot).await;
                    }
                }

                _ = &mut autokill, if autokill_deadline.is_some() => {
                    info!(broker_id = %self.id, "autokill deadline reached, stepping down");
                    break Ok(());
                }

                _ = tokio::signal::ctrl_c() => {
                    info!(broker_id = %self.id, "shutdown signal received, stepping down");
                    break Ok(());
                }
            }
        };

        if outcome.is_ok() {
            let _ = handle.resign(&*self.coordination).await;
        }

        outcome
    }

    async fn publish_primary_node(&self, zone: ZoneId, endpoint: &PrimaryEndpoint) -> Result<()> {
        let path = zone.primary_path();
        let data = endpoint.encode();
        if self.coordination.exists(&path).await? {
            self.coordination.set_data(&path, data).await?;
        } else {
            self.coordination
                .create(&path, data, CreateMode::Persistent)
                .await?;
        }
        info!(
            broker_id = %self.id, %zone, host = %endpoint.host,
            pub_reg_port = endpoint.pub_reg_port, sub_reg_port = endpoint.sub_reg_port,
            "published primary node"
        );
        Ok(())
    }

    /// Every branch below always produces a reply, and any failure inside
    /// registration bookkeeping is logged rather than propagated, so one
    /// malformed request can never take the registration loop down.
    async fn handle_publisher_request(&mut self, request: PendingRequest<PublisherRegistrationRequest>) {
        let body = request.body().clone();
        match body {
            PublisherRegistrationRequest::Register(req) => {
                let response = self.register_publisher(req).await;
                if let Err(err) = request.reply(&response).await {
                    error!(%err, "failed to reply to publisher registration");
                }
            }
            PublisherRegistrationRequest::Disconnect(req) => {
                self.disconnect_publisher(&req.disconnect.id, &req.disconnect.topics).await;
                if let Err(err) = request.reply(&DisconnectResponse::ok()).await {
                    error!(%err, "failed to ack publisher disconnect");
                }
            }
        }
    }

    async fn handle_subscriber_request(&mut self, request: PendingRequest<SubscriberRegistrationRequest>) {
        let body = request.body().clone();
        match body {
            SubscriberRegistrationRequest::Register(req) => {
                let (response, pending_notify) = self.register_subscriber(req).await;
                if let Err(err) = request.reply(&response).await {
                    error!(%err, "failed to reply to subscriber registration");
                }
                // Sent only after the reply so the subscriber has its
                // notify port and a chance to connect before the broker
                // blocks waiting for the acknowledgement.
                if let Some((subscriber_id, notifications)) = pending_notify {
                    if let Dissemination::Decentralized(decentralized) = &mut self.dissemination {
                        decentralized.notify(&subscriber_id, &notifications).await;
                    }
                }
            }
            SubscriberRegistrationRequest::Disconnect(req) => {
                self.disconnect_subscriber(
                    &req.disconnect.id,
                    &req.disconnect.topics,
                    req.disconnect.notify_port,
                )
                .await;
                if let Err(err) = request.reply(&DisconnectResponse::ok()).await {
                    error!(%err, "failed to ack subscriber disconnect");
                }
            }
        }
    }

    async fn register_publisher(&mut self, req: RegisterPublisherRequest) -> RegisterPublisherResponse {
        if req.topics.is_empty() {
            return RegisterPublisherResponse::error("malformed topic list: publisher must offer at least one topic");
        }

        let record = PublisherRecord {
            address: req.address.clone(),
            topics: req.topics.clone(),
            offered: req.offered,
            id: req.id.clone(),
        };

        if let Err(err) = self.write_shared_state_record("publishers", req.id.as_str(), &record).await {
            error!(%err, publisher_id = %req.id, "failed to write publisher shared-state node");
            return RegisterPublisherResponse::error(err.to_string());
        }

        self.registry.insert_publisher(record.clone());
        info!(publisher_id = %req.id, topics = ?req.topics, offered = req.offered, "publisher registered");

        match &mut self.dissemination {
            Dissemination::Centralized(centralized) => {
                if let Ok(addr) = req.address.parse() {
                    if let Err(err) = centralized
                        .ensure_receive_subscription(&req.topics, &req.id, addr)
                        .await
                    {
                        warn!(%err, publisher_id = %req.id, "could not open centralized receive subscription");
                    }
                } else {
                    warn!(address = %req.address, "publisher address did not parse as a socket address");
                }
            }
            Dissemination::Decentralized(decentralized) => {
                let addresses = vec![req.address.clone()];
                for topic in &req.topics {
                    for subscriber in self.registry.dominated_subscribers(topic, req.offered) {
                        let notification = NewPublisherNotification {
                            register_pub: RegisterPubBody {
                                addresses: addresses.clone(),
                                topic: topic.clone(),
                            },
                        };
                        decentralized
                            .notify(&subscriber.id, std::slice::from_ref(&notification))
                            .await;
                    }
                }
            }
        }

        RegisterPublisherResponse::ok()
    }

    async fn disconnect_publisher(&mut self, id: &ClientId, topics: &[Topic]) {
        self.registry.remove_publisher(id);
        self.delete_shared_state_node("publishers", id.as_str()).await;

        if let Dissemination::Centralized(centralized) = &mut self.dissemination {
            centralized.remove_receive_subscription(id);
            for topic in topics {
                centralized.close_topic_if_unused(topic, self.registry.has_publishers_for(topic));
            }
        }

        info!(publisher_id = %id, "publisher disconnected");
        self.recompute_load().await;
    }

    /// Returns the registration reply plus, for decentralized mode, the
    /// new-publisher notifications still owed to the subscriber. Those are
    /// sent by the caller only after the reply goes out, since the
    /// subscriber cannot connect to its notify endpoint (and so cannot
    /// acknowledge) until it has the port this reply carries.
    #[allow(clippy::type_complexity)]
    async fn register_subscriber(
        &mut self,
        req: RegisterSubscriberRequest,
    ) -> (RegisterSubscriberResponse, Option<(ClientId, Vec<NewPublisherNotification>)>) {
        let record = SubscriberRecord {
            address: req.address.clone(),
            topics: req.topics.clone(),
            requested: req.requested,
            id: req.id.clone(),
        };

        if let Err(err) = self.write_shared_state_record("subscribers", req.id.as_str(), &record).await {
            error!(%err, subscriber_id = %req.id, "failed to write subscriber shared-state node");
        }

        self.registry.insert_subscriber(record.clone());
        info!(subscriber_id = %req.id, topics = ?req.topics, requested = req.requested, "subscriber registered");

        match &mut self.dissemination {
            Dissemination::Decentralized(decentralized) => {
                let port = match decentralized.ensure_notify_endpoint(&req.id).await {
                    Ok(port) => port,
                    Err(err) => {
                        error!(%err, "could not allocate a notify endpoint");
                        let response = RegisterSubscriberResponse::Decentralized {
                            register_sub: events::NotifyPort { notify_port: 0 },
                        };
                        return (response, None);
                    }
                };

                let notifications: Vec<NewPublisherNotification> = req
                    .topics
                    .iter()
                    .map(|topic| NewPublisherNotification {
                        register_pub: RegisterPubBody {
                            addresses: self
                                .registry
                                .dominant_publishers(topic, req.requested)
                                .into_iter()
                                .map(|p| p.address.clone())
                                .collect(),
                            topic: topic.clone(),
                        },
                    })
                    .collect();

                let response = RegisterSubscriberResponse::Decentralized {
                    register_sub: events::NotifyPort { notify_port: port },
                };
                (response, Some((req.id.clone(), notifications)))
            }
            Dissemination::Centralized(centralized) => {
                let mut ports = std::collections::BTreeMap::new();
                for topic in &req.topics {
                    match centralized.ensure_send_endpoint(topic).await {
                        Ok(port) => {
                            ports.insert(topic.as_str().to_string(), port);
                        }
                        Err(err) => error!(%err, %topic, "could not allocate a send endpoint"),
                    }
                }
                (RegisterSubscriberResponse::Centralized(ports), None)
            }
        }
    }

    async fn disconnect_subscriber(&mut self, id: &ClientId, _topics: &[Topic], _notify_port: Option<u16>) {
        self.registry.remove_subscriber(id);
        self.delete_shared_state_node("subscribers", id.as_str()).await;

        if let Dissemination::Decentralized(decentralized) = &mut self.dissemination {
            decentralized.remove_notify_endpoint(id);
        }

        info!(subscriber_id = %id, "subscriber disconnected");
        self.recompute_load().await;
    }

    async fn reconcile_publishers(&mut self, children: Vec<String>) {
        let current: HashSet<ClientId> = self.registry.publisher_ids().cloned().collect();
        let latest: HashSet<ClientId> = children.into_iter().map(ClientId::from).collect();

        for removed in current.difference(&latest) {
            self.registry.remove_publisher(removed);
            debug!(publisher_id = %removed, "publisher removed by watch reconciliation");
        }

        for added in latest.difference(&current) {
            match self.read_shared_state_record::<PublisherRecord>("publishers", added.as_str()).await {
                Ok(Some(record)) => {
                    if let Dissemination::Decentralized(decentralized) = &mut self.dissemination {
                        for topic in &record.topics {
                            let addresses = vec![record.address.clone()];
                            for subscriber in self.registry.dominated_subscribers(topic, record.offered) {
                                let notification = NewPublisherNotification {
                                    register_pub: RegisterPubBody {
                                        addresses: addresses.clone(),
                                        topic: topic.clone(),
                                    },
                                };
                                decentralized
                                    .notify(&subscriber.id, std::slice::from_ref(&notification))
                                    .await;
                            }
                        }
                    }
                    self.registry.insert_publisher(record);
                    debug!(publisher_id = %added, "publisher added by watch reconciliation");
                }
                Ok(None) => {}
                Err(err) => error!(%err, publisher_id = %added, "failed to read publisher shared-state node"),
            }
        }
    }

    async fn reconcile_subscribers(&mut self, children: Vec<String>) {
        let current: HashSet<ClientId> = self.registry.subscriber_ids().cloned().collect();
        let latest: HashSet<ClientId> = children.into_iter().map(ClientId::from).collect();

        for removed in current.difference(&latest) {
            self.registry.remove_subscriber(removed);
            debug!(subscriber_id = %removed, "subscriber removed by watch reconciliation");
        }

        for added in latest.difference(&current) {
            match self.read_shared_state_record::<SubscriberRecord>("subscribers", added.as_str()).await {
                Ok(Some(record)) => {
                    self.registry.insert_subscriber(record);
                    debug!(subscriber_id = %added, "subscriber added by watch reconciliation");
                }
                Ok(None) => {}
                Err(err) => error!(%err, subscriber_id = %added, "failed to read subscriber shared-state node"),
            }
        }
    }

    async fn write_shared_state_record<T: serde::Serialize>(
        &self,
        kind: &str,
        id: &str,
        record: &T,
    ) -> Result<()> {
        let path = format!("/shared_state/{kind}/{id}");
        let data = serde_json::to_vec(record)?;
        match self.coordination.create(&path, data.clone(), CreateMode::Persistent).await {
            Ok(_) => Ok(()),
            Err(coordination::Error::NodeExists(_)) => {
                self.coordination.set_data(&path, data).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_shared_state_record<T: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let path = format!("/shared_state/{kind}/{id}");
        match self.coordination.get_data(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(coordination::Error::NoNode(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_shared_state_node(&self, kind: &str, id: &str) {
        let path = format!("/shared_state/{kind}/{id}");
        if let Err(err) = self.coordination.delete(&path).await {
            if !matches!(err, coordination::Error::NoNode(_)) {
                error!(%err, %path, "failed to delete shared-state node");
            }
        }
    }

    async fn recompute_load(&self) {
        if let Err(err) = update_current_load(
            &*self.coordination,
            self.registry.num_publishers(),
            self.registry.num_subscribers(),
        )
        .await
        {
            error!(%err, "failed to update current_load");
        }
    }
}
