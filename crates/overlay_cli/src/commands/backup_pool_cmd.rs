use std::sync::Arc;

use coordination::InMemoryCoordinationClient;
use overlay_config::{BackupPoolConfig, CoordinationConfig};
use telemetry::info;

use crate::{cli::BackupPoolOpts, result::Result};

pub async fn run(opts: BackupPoolOpts, coordination: Arc<InMemoryCoordinationClient>) -> Result<()> {
    let config = BackupPoolConfig {
        load_threshold: opts.load_threshold,
        centralized: opts.centralized,
        coordination: CoordinationConfig {
            zookeeper_hosts: opts.coordination.zookeeper_hosts,
        },
        ..BackupPoolConfig::default()
    };

    info!(threshold = config.load_threshold, "starting backup pool");
    backup_pool::run(config, coordination).await?;
    Ok(())
}
