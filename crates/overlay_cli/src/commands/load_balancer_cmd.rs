use std::sync::Arc;

use coordination::InMemoryCoordinationClient;
use overlay_config::{CoordinationConfig, LoadBalancerConfig};
use telemetry::info;

use crate::{cli::LoadBalancerOpts, result::Result};

pub async fn run(opts: LoadBalancerOpts, coordination: Arc<InMemoryCoordinationClient>) -> Result<()> {
    let config = LoadBalancerConfig {
        load_threshold: opts.load_threshold,
        centralized: opts.centralized,
        coordination: CoordinationConfig {
            zookeeper_hosts: opts.coordination.zookeeper_hosts,
        },
        ..LoadBalancerConfig::default()
    };

    info!(threshold = config.load_threshold, "starting load balancer");
    load_balancer::run(config, coordination).await?;
    Ok(())
}
