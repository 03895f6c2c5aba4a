use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use coordination::CoordinationClient;
use events::{
    select_tail, DisconnectBody, DisconnectRequest, DisconnectResponse, EventRecord,
    NewPublisherNotification, ReceivedRecord, RegisterSubscriberRequest, RegisterSubscriberResponse,
};
use overlay_config::SubscriberConfig;
use primitives::{ClientId, PrimaryEndpoint, Topic};
use telemetry::{debug, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};
use wire::{NotifyClient, SubscribeEndpoint};

use crate::{
    zone::{pick_zone, read_primary},
    Error, Result,
};

const NOTIFICATION_TOPIC: &[u8] = b"register_pub";
const CHANNEL_CAPACITY: usize = 256;
const NOTIFICATION_ACK: &str = "Notification Acknowledged. New publishers added.";

/// One subscribing client: registers topic interests with its zone's
/// primary, then either connects directly to publishers (decentralized)
/// or to the broker's per-topic forwarding sockets (centralized).
pub struct Subscriber<C: CoordinationClient> {
    id: ClientId,
    config: SubscriberConfig,
    coordination: Arc<C>,
    received: Vec<ReceivedRecord>,
}

impl<C: CoordinationClient + 'static> Subscriber<C> {
    pub fn new(config: SubscriberConfig, coordination: Arc<C>) -> Self {
        Self {
            id: ClientId::new(),
            config,
            coordination,
            received: Vec::new(),
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn received(&self) -> &[ReceivedRecord] {
        &self.received
    }

    pub async fn run(mut self) -> Result<()> {
        let zone = pick_zone(&*self.coordination).await?;
        info!(subscriber_id = %self.id, %zone, "subscriber assigned to zone");

        let address = primitives::local_ip_address().to_string();
        let mut primary = read_primary(&*self.coordination, zone).await?;

        let (tx, mut rx) = mpsc::channel::<(Bytes, Bytes)>(CHANNEL_CAPACITY);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        let mut notify_port: Option<u16> = None;
        let mut connected: HashSet<SocketAddr> = HashSet::new();

        self.register_and_connect(&primary, &address, &tx, &mut tasks, &mut notify_port, &mut connected)
            .await?;

        let mut watch = self.coordination.watch_data(&zone.primary_path()).await?;
        let mut switching = false;

        let outcome: Result<()> = loop {
            if !self.config.indefinite && self.received.len() >= self.config.max_event_count {
                break Ok(());
            }

            tokio::select! {
                biased;

                message = rx.recv(), if !switching => {
                    match message {
                        Some((topic, payload)) => {
                            self.handle_message(&primary, &tx, &mut tasks, &mut connected, topic, payload).await;
                        }
                        None => {}
                    }
                }

                changed = watch.changed() => {
                    if changed.is_err() {
                        break Err(Error::Coordination(coordination::Error::SessionLost));
                    }

                    switching = true;
                    info!(subscriber_id = %self.id, %zone, "primary changed, reconfiguring");
                    abort_all(&mut tasks);
                    notify_port = None;
                    connected.clear();

                    match read_primary(&*self.coordination, zone).await {
                        Ok(new_primary) => {
                            primary = new_primary;
                            if let Err(err) = self
                                .register_and_connect(&primary, &address, &tx, &mut tasks, &mut notify_port, &mut connected)
                                .await
                            {
                                warn!(%err, "re-registration with new primary failed");
                            }
                        }
                        Err(err) => warn!(%err, "failed to read new primary node"),
                    }

                    switching = false;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!(subscriber_id = %self.id, "shutdown signal received");
                    break Ok(());
                }
            }
        };

        abort_all(&mut tasks);

        if !self.config.indefinite {
            if let Some(path) = self.config.filename.clone() {
                if let Err(err) = self.write_received_log(&path) {
                    warn!(%err, "failed to write received-event log");
                }
            }
        }

        let _ = self.disconnect(&primary, &address, notify_port).await;
        outcome
    }

    async fn register_and_connect(
        &self,
        primary: &PrimaryEndpoint,
        address: &str,
        tx: &mpsc::Sender<(Bytes, Bytes)>,
        tasks: &mut Vec<JoinHandle<()>>,
        notify_port: &mut Option<u16>,
        connected: &mut HashSet<SocketAddr>,
    ) -> Result<()> {
        let request = RegisterSubscriberRequest {
            address: address.to_string(),
            topics: self.config.topics.clone(),
            requested: self.config.requested,
            id: self.id.clone(),
        };

        let response: RegisterSubscriberResponse = wire::call(primary.sub_reg_addr(), &request).await?;
        info!(subscriber_id = %self.id, %address, "registered with primary");

        match response {
            RegisterSubscriberResponse::Decentralized { register_sub } => {
                *notify_port = Some(register_sub.notify_port);
                let notify_addr =
                    std::net::SocketAddr::new(primary.host, register_sub.notify_port);
                spawn_notify_forwarder(notify_addr, tx.clone(), tasks).await;
            }
            RegisterSubscriberResponse::Centralized(ports) => {
                for (topic, port) in ports {
                    let addr = std::net::SocketAddr::new(primary.host, port);
                    spawn_forwarder(addr, tx.clone(), tasks, connected).await;
                    debug!(subscriber_id = %self.id, %topic, port, "connected to centralized forward socket");
                }
            }
        }

        Ok(())
    }

    async fn handle_message(
        &mut self,
        primary: &PrimaryEndpoint,
        tx: &mpsc::Sender<(Bytes, Bytes)>,
        tasks: &mut Vec<JoinHandle<()>>,
        connected: &mut HashSet<SocketAddr>,
        topic: Bytes,
        payload: Bytes,
    ) {
        if topic.as_ref() == NOTIFICATION_TOPIC {
            self.handle_notification(primary, tx, tasks, connected, &payload).await;
            return;
        }

        let topic = Topic::from(String::from_utf8_lossy(&topic).into_owned());
        if !self.config.topics.contains(&topic) {
            // A directly-connected publisher multiplexes every topic it
            // offers over one endpoint; only the topics this subscriber
            // actually requested are kept.
            return;
        }

        let history: Vec<EventRecord> = match serde_json::from_slice(&payload) {
            Ok(history) => history,
            Err(err) => {
                warn!(%err, %topic, "discarding malformed event payload");
                return;
            }
        };

        let tail = select_tail(&history, self.config.requested);
        let now = now_seconds();
        for record in tail {
            self.received.push(ReceivedRecord {
                publisher: record.publisher.clone(),
                topic: record.topic.clone(),
                total_time_seconds: now - record.publish_time,
            });
        }
        debug!(subscriber_id = %self.id, %topic, total = self.received.len(), "recorded delivered events");
    }

    async fn handle_notification(
        &self,
        _primary: &PrimaryEndpoint,
        tx: &mpsc::Sender<(Bytes, Bytes)>,
        tasks: &mut Vec<JoinHandle<()>>,
        connected: &mut HashSet<SocketAddr>,
        payload: &[u8],
    ) {
        let notifications: Vec<NewPublisherNotification> = match serde_json::from_slice(payload) {
            Ok(notifications) => notifications,
            Err(err) => {
                warn!(%err, "discarding malformed new-publisher notification");
                return;
            }
        };

        for notification in notifications {
            let topic = notification.register_pub.topic;
            for address in notification.register_pub.addresses {
                match address.parse::<std::net::SocketAddr>() {
                    Ok(addr) => {
                        // A publisher offering several topics the subscriber
                        // is interested in is still named once per matching
                        // topic notification; connect to it only once.
                        if connected.contains(&addr) {
                            continue;
                        }
                        info!(subscriber_id = %self.id, %topic, %address, "connecting directly to publisher");
                        spawn_forwarder(addr, tx.clone(), tasks, connected).await;
                    }
                    Err(err) => warn!(%err, %address, "publisher address did not parse"),
                }
            }
        }
    }

    fn write_received_log(&self, path: &std::path::Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.received {
            writer.serialize(record)?;
        }
        writer.flush().map_err(|err| Error::Csv(csv::Error::from(err)))?;
        info!(subscriber_id = %self.id, path = %path.display(), rows = self.received.len(), "wrote received-event log");
        Ok(())
    }

    async fn disconnect(
        &self,
        primary: &PrimaryEndpoint,
        address: &str,
        notify_port: Option<u16>,
    ) -> Result<()> {
        let request = DisconnectRequest {
            disconnect: DisconnectBody {
                id: self.id.clone(),
                address: address.to_string(),
                topics: self.config.topics.clone(),
                notify_port,
            },
        };

        let _: DisconnectResponse = wire::call(primary.sub_reg_addr(), &request).await?;
        info!(subscriber_id = %self.id, "disconnected from primary");
        Ok(())
    }
}

async fn spawn_forwarder(
    addr: SocketAddr,
    tx: mpsc::Sender<(Bytes, Bytes)>,
    tasks: &mut Vec<JoinHandle<()>>,
    connected: &mut HashSet<SocketAddr>,
) {
    let mut endpoint = match SubscribeEndpoint::connect(addr).await {
        Ok(endpoint) => endpoint,
        Err(err) => {
            warn!(%err, %addr, "could not connect to publish endpoint");
            return;
        }
    };

    let handle = tokio::spawn(async move {
        loop {
            match endpoint.recv().await {
                Ok((topic, payload)) => {
                    if tx.send((topic, payload)).await.is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    });

    connected.insert(addr);
    tasks.push(handle);
}

/// Connects to the broker's notify endpoint for this subscriber and
/// acknowledges every new-publisher notification as soon as it arrives,
/// the way the original replied on its `REP` socket before moving on to
/// connect to the named publishers.
async fn spawn_notify_forwarder(
    addr: SocketAddr,
    tx: mpsc::Sender<(Bytes, Bytes)>,
    tasks: &mut Vec<JoinHandle<()>>,
) {
    let mut client = match NotifyClient::connect(addr).await {
        Ok(client) => client,
        Err(err) => {
            warn!(%err, %addr, "could not connect to notify endpoint");
            return;
        }
    };

    let handle = tokio::spawn(async move {
        loop {
            let payload = match client.recv().await {
                Ok(payload) => payload,
                Err(_) => return,
            };

            if client.ack(NOTIFICATION_ACK).await.is_err() {
                return;
            }

            if tx
                .send((Bytes::from_static(NOTIFICATION_TOPIC), payload))
                .await
                .is_err()
            {
                return;
            }
        }
    });

    tasks.push(handle);
}

fn abort_all(tasks: &mut Vec<JoinHandle<()>>) {
    for task in tasks.drain(..) {
        task.abort();
    }
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
