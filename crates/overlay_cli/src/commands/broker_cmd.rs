use std::sync::Arc;

use broker::Broker;
use coordination::InMemoryCoordinationClient;
use overlay_config::{BrokerConfig, CoordinationConfig};
use telemetry::info;

use crate::{cli::BrokerOpts, result::Result};

pub async fn run(opts: BrokerOpts, coordination: Arc<InMemoryCoordinationClient>) -> Result<()> {
    let config = BrokerConfig {
        zone: crate::cli::parse_zone(opts.zone),
        host: opts.host,
        pub_reg_port: opts.pub_reg_port,
        sub_reg_port: opts.sub_reg_port,
        centralized: opts.centralized,
        indefinite: opts.indefinite,
        max_event_count: opts.max_event_count,
        autokill_secs: opts.autokill_secs,
        coordination: CoordinationConfig {
            zookeeper_hosts: opts.coordination.zookeeper_hosts,
        },
        ..BrokerConfig::default()
    };

    info!(zone = %config.zone, centralized = config.centralized, "starting broker");
    Broker::new(config, coordination).run().await?;
    Ok(())
}
