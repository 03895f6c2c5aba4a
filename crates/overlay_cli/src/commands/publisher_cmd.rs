use std::{sync::Arc, time::Duration};

use coordination::InMemoryCoordinationClient;
use overlay_config::{CoordinationConfig, PublisherConfig};
use publisher::Publisher;
use telemetry::info;

use crate::{cli::PublisherOpts, result::Result};

pub async fn run(opts: PublisherOpts, coordination: Arc<InMemoryCoordinationClient>) -> Result<()> {
    let config = PublisherConfig {
        topics: crate::cli::parse_topics(&opts.topics),
        offered: opts.offered,
        bind_port: opts.bind_port,
        sleep_period: Duration::from_secs(opts.sleep_period_secs),
        indefinite: opts.indefinite,
        max_event_count: opts.max_event_count,
        coordination: CoordinationConfig {
            zookeeper_hosts: opts.coordination.zookeeper_hosts,
        },
        ..PublisherConfig::default()
    };

    info!(topics = ?config.topics, offered = config.offered, "starting publisher");
    Publisher::new(config, coordination).run().await?;
    Ok(())
}
