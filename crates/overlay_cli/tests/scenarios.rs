//! End-to-end scenarios that exercise a real broker, publisher and
//! subscriber together against the in-memory coordination client, the
//! way `node/tests/startup.rs` exercises a full node against an
//! in-memory backing store rather than unit-testing its pieces.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use backup_pool::run as run_backup_pool;
use broker::Broker;
use coordination::{CoordinationClient, InMemoryCoordinationClient};
use overlay_config::{BackupPoolConfig, BrokerConfig, PublisherConfig, SubscriberConfig};
use primitives::{PrimaryEndpoint, Topic, ZoneId};
use publisher::Publisher;
use subscriber::Subscriber;

fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

async fn wait_for_primary(client: &InMemoryCoordinationClient, zone: ZoneId) {
    for _ in 0..200 {
        if client.exists(&zone.primary_path()).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("primary for {zone} never appeared");
}

fn scratch_csv_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("overlay-scenario-{name}-{}.csv", std::process::id()))
}

fn read_csv_topics(path: &PathBuf) -> Vec<(String, String)> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let publisher_idx = headers.iter().position(|h| h == "publisher").unwrap();
    let topic_idx = headers.iter().position(|h| h == "topic").unwrap();

    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            (
                record.get(publisher_idx).unwrap().to_string(),
                record.get(topic_idx).unwrap().to_string(),
            )
        })
        .collect()
}

/// Scenario 1: a single centralized zone, one publisher offering exactly
/// what the subscriber requests, cycling through three topics.
#[tokio::test]
async fn centralized_single_zone_delivers_every_cycled_topic() {
    let root = InMemoryCoordinationClient::new();
    let zone = ZoneId(101);

    let broker = Broker::new(
        BrokerConfig {
            zone,
            centralized: true,
            indefinite: true,
            pub_reg_port: 0,
            sub_reg_port: 0,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let broker_task = tokio::spawn(async move { broker.run().await });
    wait_for_primary(&root, zone).await;

    let csv_path = scratch_csv_path("centralized");
    let subscriber = Subscriber::new(
        SubscriberConfig {
            topics: vec![Topic::from("A"), Topic::from("B"), Topic::from("C")],
            requested: 1,
            indefinite: false,
            max_event_count: 6,
            filename: Some(csv_path.clone()),
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let subscriber_task = tokio::spawn(async move { subscriber.run().await });

    // Let the subscriber finish registering and connecting to all three
    // centralized forward sockets before the publisher starts emitting.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let publisher = Publisher::new(
        PublisherConfig {
            topics: vec![Topic::from("A"), Topic::from("B"), Topic::from("C")],
            offered: 1,
            sleep_period: Duration::from_millis(30),
            indefinite: false,
            max_event_count: 6,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let publisher_task = tokio::spawn(async move { publisher.run().await });

    publisher_task.await.unwrap().unwrap();
    subscriber_task.await.unwrap().unwrap();
    broker_task.abort();

    let rows = read_csv_topics(&csv_path);
    std::fs::remove_file(&csv_path).ok();

    assert_eq!(rows.len(), 6);
    for topic in ["A", "B", "C"] {
        let count = rows.iter().filter(|(_, t)| t == topic).count();
        assert_eq!(count, 2, "topic {topic} should have been delivered twice");
    }
}

/// Scenario 2: a decentralized subscriber requesting more history than an
/// initial publisher offers sees nothing until a second, sufficiently
/// provisioned publisher registers.
#[tokio::test]
async fn decentralized_dominance_violation_then_recovery() {
    let root = InMemoryCoordinationClient::new();
    let zone = ZoneId(102);

    let broker = Broker::new(
        BrokerConfig {
            zone,
            centralized: false,
            indefinite: true,
            pub_reg_port: 0,
            sub_reg_port: 0,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let broker_task = tokio::spawn(async move { broker.run().await });
    wait_for_primary(&root, zone).await;

    let csv_path = scratch_csv_path("decentralized");
    let subscriber = Subscriber::new(
        SubscriberConfig {
            topics: vec![Topic::from("X")],
            requested: 3,
            indefinite: false,
            max_event_count: 1,
            filename: Some(csv_path.clone()),
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let subscriber_task = tokio::spawn(async move { subscriber.run().await });

    // Give the subscriber time to register and open its notify endpoint.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let insufficient = Publisher::new(
        PublisherConfig {
            topics: vec![Topic::from("X")],
            offered: 1,
            sleep_period: Duration::from_millis(10),
            indefinite: false,
            max_event_count: 2,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    insufficient.run().await.unwrap();

    // The subscriber must still be waiting: nobody has dominated it yet.
    assert!(!subscriber_task.is_finished());

    let sufficient = Publisher::new(
        PublisherConfig {
            topics: vec![Topic::from("X")],
            offered: 3,
            // Give the subscriber's notify-triggered connection time to land
            // before the single event is emitted; a publish endpoint has no
            // replay buffer for subscribers that connect late.
            sleep_period: Duration::from_millis(150),
            indefinite: false,
            max_event_count: 1,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    sufficient.run().await.unwrap();

    subscriber_task.await.unwrap().unwrap();
    broker_task.abort();

    let rows = read_csv_topics(&csv_path);
    std::fs::remove_file(&csv_path).ok();

    assert_eq!(rows.len(), 1);
}

/// Scenario 3: a zone's primary steps down, a standby takes over, and a
/// long-lived publisher reconnects to the new primary under the same id
/// with no duplicate registry entry left behind.
#[tokio::test]
async fn leader_takeover_reattaches_clients_without_duplicate_ids() {
    let root = InMemoryCoordinationClient::new();
    let zone = ZoneId(103);

    let first = Broker::new(
        BrokerConfig {
            zone,
            indefinite: true,
            autokill_secs: Some(1),
            pub_reg_port: 0,
            sub_reg_port: 0,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let first_task = tokio::spawn(async move { first.run().await });
    wait_for_primary(&root, zone).await;

    let first_endpoint = PrimaryEndpoint::decode(&root.get_data(&zone.primary_path()).await.unwrap()).unwrap();

    let standby = Broker::new(
        BrokerConfig {
            zone,
            indefinite: true,
            pub_reg_port: 0,
            sub_reg_port: 0,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let standby_task = tokio::spawn(async move { standby.run().await });

    let publisher = Publisher::new(
        PublisherConfig {
            topics: vec![Topic::from("Y")],
            offered: 1,
            sleep_period: Duration::from_millis(50),
            indefinite: true,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let publisher_task = tokio::spawn(async move { publisher.run().await });

    // Wait for the first primary's autokill to fire and the standby to
    // publish a new endpoint for the zone.
    let mut new_endpoint = first_endpoint.clone();
    for _ in 0..300 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Ok(data) = root.get_data(&zone.primary_path()).await {
            if let Ok(decoded) = PrimaryEndpoint::decode(&data) {
                if decoded != first_endpoint {
                    new_endpoint = decoded;
                    break;
                }
            }
        }
    }
    assert_ne!(new_endpoint, first_endpoint, "standby never took over the zone");

    // Give the publisher's data-watch callback time to reconnect to the
    // new primary with its existing id.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let publisher_ids = root.children("/shared_state/publishers").await.unwrap();
    assert_eq!(publisher_ids.len(), 1, "reattachment must not duplicate the publisher's registry entry");

    first_task.abort();
    standby_task.abort();
    publisher_task.abort();
}

/// Scenario 4: the backup pool materializes a new zone once aggregate
/// load crosses its configured threshold.
#[tokio::test]
async fn backup_pool_autoscales_past_the_load_threshold() {
    let root = InMemoryCoordinationClient::new();

    let config = BackupPoolConfig {
        load_threshold: 1.0,
        ..Default::default()
    };
    let pool_client = Arc::new(root.connect());
    let pool_task = tokio::spawn(run_backup_pool(config, pool_client));

    root.ensure_path("/shared_state").await.unwrap();
    root.ensure_path("/primaries").await.unwrap();
    root.create(
        "/primaries/zone_1",
        b"127.0.0.1,0,0".to_vec(),
        coordination::CreateMode::Persistent,
    )
    .await
    .unwrap();

    // The pool creates `current_load` itself on startup; wait for it,
    // then push it past the threshold.
    for _ in 0..100 {
        if root.exists(broker::CURRENT_LOAD_PATH).await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    root.set_data(broker::CURRENT_LOAD_PATH, b"4.0".to_vec()).await.unwrap();

    for _ in 0..200 {
        if root.exists("/primaries/zone_2").await.unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(root.exists("/primaries/zone_2").await.unwrap(), "backup pool never spun up zone 2");

    pool_task.abort();
}

/// Scenario 5: a publisher and subscriber that disconnect cleanly leave no
/// registry node behind, and the subscriber's finite-mode run still writes
/// its CSV log.
#[tokio::test]
async fn clean_disconnect_removes_registry_nodes_and_writes_the_log() {
    let root = InMemoryCoordinationClient::new();
    let zone = ZoneId(104);

    let broker = Broker::new(
        BrokerConfig {
            zone,
            centralized: true,
            indefinite: true,
            pub_reg_port: 0,
            sub_reg_port: 0,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let broker_task = tokio::spawn(async move { broker.run().await });
    wait_for_primary(&root, zone).await;

    let csv_path = scratch_csv_path("disconnect");
    let subscriber = Subscriber::new(
        SubscriberConfig {
            topics: vec![Topic::from("A")],
            requested: 1,
            indefinite: false,
            max_event_count: 1,
            filename: Some(csv_path.clone()),
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let subscriber_task = tokio::spawn(async move { subscriber.run().await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    let publisher = Publisher::new(
        PublisherConfig {
            topics: vec![Topic::from("A")],
            offered: 1,
            sleep_period: Duration::from_millis(30),
            indefinite: false,
            max_event_count: 1,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let publisher_task = tokio::spawn(async move { publisher.run().await });

    publisher_task.await.unwrap().unwrap();
    subscriber_task.await.unwrap().unwrap();
    broker_task.abort();

    assert!(
        root.children("/shared_state/publishers").await.unwrap().is_empty(),
        "publisher's registry node should be removed on disconnect"
    );
    assert!(
        root.children("/shared_state/subscribers").await.unwrap().is_empty(),
        "subscriber's registry node should be removed on disconnect"
    );

    let rows = read_csv_topics(&csv_path);
    std::fs::remove_file(&csv_path).ok();
    assert_eq!(rows.len(), 1);
}

/// Scenario 6: when a broker's configured registration port is already
/// taken, it retries upward and the port it actually bound is reflected
/// in the published primary-node value.
#[tokio::test]
async fn broker_retries_past_a_port_already_in_use() {
    let held = std::net::TcpListener::bind((loopback(), 0)).unwrap();
    let held_port = held.local_addr().unwrap().port();

    let root = InMemoryCoordinationClient::new();
    let zone = ZoneId(106);

    let broker = Broker::new(
        BrokerConfig {
            zone,
            indefinite: true,
            pub_reg_port: held_port,
            sub_reg_port: 0,
            ..Default::default()
        },
        Arc::new(root.connect()),
    );
    let broker_task = tokio::spawn(async move { broker.run().await });
    wait_for_primary(&root, zone).await;

    let endpoint = PrimaryEndpoint::decode(&root.get_data(&zone.primary_path()).await.unwrap()).unwrap();
    assert_ne!(endpoint.pub_reg_port, held_port);

    broker_task.abort();
    drop(held);
}
