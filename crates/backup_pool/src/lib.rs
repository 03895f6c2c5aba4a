//! The autoscale-up actor: watches `/shared_state/current_load` and,
//! whenever it crosses the configured threshold, materializes a fresh
//! broker in a brand-new zone. The new broker runs its ordinary
//! election→leadership path; in an empty zone it wins immediately and
//! publishes `/primaries/zone_<N>` itself, exactly like any other broker.

mod error;

use std::sync::Arc;

use broker::Broker;
use coordination::{CoordinationClient, CreateMode};
use overlay_config::{BackupPoolConfig, BrokerConfig};
use primitives::ZoneId;
use telemetry::{error, info, warn};

pub use crate::error::{Error, Result};

/// Parses the numeric value stored at `/shared_state/current_load`,
/// tolerating the node not existing yet (treated as zero load).
async fn read_current_load<C: CoordinationClient + ?Sized>(client: &C) -> Result<f64> {
    match client.get_data(broker::CURRENT_LOAD_PATH).await {
        Ok(data) => {
            let text = String::from_utf8_lossy(&data);
            Ok(text.trim().parse().unwrap_or(0.0))
        }
        Err(coordination::Error::NoNode(_)) => Ok(0.0),
        Err(err) => Err(err.into()),
    }
}

/// Computes `max(existing zone ids) + 1` from `/primaries`'s children and
/// spawns a fresh [`Broker`] contending for that zone, running it to
/// completion on its own task. Spawning is fire-and-forget: the backup
/// pool never waits on a spun-up broker, it only starts it.
async fn spin_up_new_broker<C: CoordinationClient + 'static>(
    config: &BackupPoolConfig,
    coordination: &Arc<C>,
) -> Result<ZoneId> {
    let children = coordination.children("/primaries").await?;
    let existing: Vec<ZoneId> = children
        .iter()
        .filter_map(|name| ZoneId::parse_child_name(name))
        .collect();
    let zone = ZoneId::next_after(existing);

    let broker_config = BrokerConfig {
        zone,
        centralized: config.centralized,
        ..BrokerConfig::default()
    };

    let broker = Broker::new(broker_config, Arc::clone(coordination));
    let broker_id = broker.id().to_string();

    tokio::spawn(async move {
        if let Err(err) = broker.run().await {
            error!(%err, broker_id, "autoscaled broker exited with an error");
        }
    });

    info!(%zone, "backup pool spun up a new broker");
    Ok(zone)
}

/// Runs the backup pool to completion: ensures `/shared_state/current_load`
/// exists, then reacts to every change, spinning up a new zone whenever the
/// load exceeds [`BackupPoolConfig::load_threshold`]. Runs until a shutdown
/// signal arrives or the coordinator session is lost.
pub async fn run<C: CoordinationClient + 'static>(
    config: BackupPoolConfig,
    coordination: Arc<C>,
) -> Result<()> {
    coordination.ensure_path("/primaries").await?;

    if !coordination.exists(broker::CURRENT_LOAD_PATH).await? {
        coordination
            .create(broker::CURRENT_LOAD_PATH, b"0".to_vec(), CreateMode::Persistent)
            .await?;
    }

    let mut watch = coordination.watch_data(broker::CURRENT_LOAD_PATH).await?;
    let mut connection_state = coordination.connection_state();

    loop {
        let load = read_current_load(&*coordination).await?;
        if load > config.load_threshold {
            info!(load, threshold = config.load_threshold, "load threshold exceeded");
            if let Err(err) = spin_up_new_broker(&config, &coordination).await {
                warn!(%err, "failed to spin up a new broker");
            }
        }

        tokio::select! {
            biased;

            changed = connection_state.changed() => {
                if changed.is_err() || matches!(
                    *connection_state.borrow(),
                    coordination::ConnectionState::Lost
                ) {
                    return Err(Error::SessionLost);
                }
            }

            changed = watch.changed() => {
                if changed.is_err() {
                    return Err(Error::SessionLost);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("backup pool shutdown signal received");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use coordination::InMemoryCoordinationClient;

    use super::*;

    #[tokio::test]
    async fn spin_up_new_broker_picks_the_next_unused_zone() {
        let client: Arc<InMemoryCoordinationClient> = Arc::new(InMemoryCoordinationClient::new());
        client.ensure_path("/primaries").await.unwrap();
        client
            .create("/primaries/zone_1", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();

        let config = BackupPoolConfig::default();
        let zone = spin_up_new_broker(&config, &client).await.unwrap();

        assert_eq!(zone, ZoneId(2));

        // give the spawned broker a moment to win its (uncontested) election
        for _ in 0..50 {
            if client.exists("/primaries/zone_2").await.unwrap() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(client.exists("/primaries/zone_2").await.unwrap());
    }

    #[tokio::test]
    async fn read_current_load_defaults_to_zero_when_absent() {
        let client = InMemoryCoordinationClient::new();
        assert_eq!(read_current_load(&client).await.unwrap(), 0.0);
    }
}
