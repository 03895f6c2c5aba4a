use std::sync::Arc;

use coordination::InMemoryCoordinationClient;
use overlay_config::{CoordinationConfig, SubscriberConfig};
use subscriber::Subscriber;
use telemetry::info;

use crate::{cli::SubscriberOpts, result::Result};

pub async fn run(opts: SubscriberOpts, coordination: Arc<InMemoryCoordinationClient>) -> Result<()> {
    let config = SubscriberConfig {
        topics: crate::cli::parse_topics(&opts.topics),
        requested: opts.requested,
        indefinite: opts.indefinite,
        max_event_count: opts.max_event_count,
        filename: opts.filename,
        coordination: CoordinationConfig {
            zookeeper_hosts: opts.coordination.zookeeper_hosts,
        },
        ..SubscriberConfig::default()
    };

    info!(topics = ?config.topics, requested = config.requested, "starting subscriber");
    Subscriber::new(config, coordination).run().await?;
    Ok(())
}
