//! The administrative counterpart to [`backup_pool`]: watches
//! `/primaries`' children, `/shared_state/current_load`, and maintains a
//! standby broker per zone so a primary failure is covered by a warm
//! contender. It never touches client sockets directly — only the
//! coordination tree and the standby brokers it spawns itself.

mod error;
mod pool;

use std::sync::Arc;

use coordination::CoordinationClient;
use overlay_config::LoadBalancerConfig;
use primitives::ZoneId;
use telemetry::info;

pub use crate::error::{Error, Result};
pub use crate::pool::BackupPool;

async fn num_clients<C: CoordinationClient + ?Sized>(client: &C) -> Result<usize> {
    let publishers = client.children("/shared_state/publishers").await?.len();
    let subscribers = client.children("/shared_state/subscribers").await?.len();
    Ok(publishers + subscribers)
}

async fn zones<C: CoordinationClient + ?Sized>(client: &C) -> Result<Vec<ZoneId>> {
    Ok(client
        .children("/primaries")
        .await?
        .iter()
        .filter_map(|name| ZoneId::parse_child_name(name))
        .collect())
}

/// One reconciliation pass: ensures every live zone has a standby, then
/// applies the promote/demote policy against the current client count.
///
/// Promotion readiness: every zone currently in `/primaries` gets a
/// standby if it doesn't have one yet — this is the "promote backups to
/// primaries" behavior, prepared in advance rather than performed
/// on-demand, since by the time a primary has actually failed there is no
/// external signal left to promote *from*.
///
/// Demotion: with more than one zone, `num_clients / (num_zones - 1)` is
/// the load the system would carry if its least-loaded zone were folded
/// away. When that figure is still at or under threshold, retire the
/// standby for the highest-numbered zone — freeing the spare resource
/// without touching the zone's active primary or its clients.
async fn reconcile<C: CoordinationClient + 'static>(
    config: &LoadBalancerConfig,
    coordination: &Arc<C>,
    pool: &mut BackupPool,
) -> Result<()> {
    let live_zones = zones(&**coordination).await?;
    for &zone in &live_zones {
        pool.ensure_backup(zone, config, coordination);
    }

    let clients = num_clients(&**coordination).await?;
    let num_zones = live_zones.len();

    if num_zones > 1 {
        let ratio = clients as f64 / (num_zones - 1) as f64;
        if ratio <= config.load_threshold {
            if let Some(zone) = pool.highest_zone() {
                info!(zone = %zone, clients, num_zones, ratio, "demoting: retiring a standby broker");
                pool.retire_backup(zone);
            }
        }
    }

    Ok(())
}

/// Runs the load balancer to completion: reconciles immediately, then on
/// every change to `/primaries`'s children or `/shared_state/current_load`,
/// until a shutdown signal arrives or the coordinator session is lost.
pub async fn run<C: CoordinationClient + 'static>(
    config: LoadBalancerConfig,
    coordination: Arc<C>,
) -> Result<()> {
    coordination.ensure_path("/primaries").await?;
    coordination.ensure_path("/shared_state/publishers").await?;
    coordination.ensure_path("/shared_state/subscribers").await?;

    if !coordination.exists(broker::CURRENT_LOAD_PATH).await? {
        coordination
            .create(
                broker::CURRENT_LOAD_PATH,
                b"0".to_vec(),
                coordination::CreateMode::Persistent,
            )
            .await?;
    }

    let mut pool = BackupPool::new();
    reconcile(&config, &coordination, &mut pool).await?;

    let mut zones_watch = coordination.watch_children("/primaries").await?;
    let mut load_watch = coordination.watch_data(broker::CURRENT_LOAD_PATH).await?;
    let mut connection_state = coordination.connection_state();

    loop {
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

            changed = zones_watch.changed() => {
                if changed.is_err() {
                    return Err(Error::SessionLost);
                }
                reconcile(&config, &coordination, &mut pool).await?;
            }

            changed = load_watch.changed() => {
                if changed.is_err() {
                    return Err(Error::SessionLost);
                }
                reconcile(&config, &coordination, &mut pool).await?;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("load balancer shutdown signal received");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use coordination::{CreateMode, InMemoryCoordinationClient};

    use super::*;

    #[tokio::test]
    async fn reconcile_maintains_one_standby_per_live_zone() {
        let client: Arc<InMemoryCoordinationClient> = Arc::new(InMemoryCoordinationClient::new());
        client.ensure_path("/primaries").await.unwrap();
        client
            .create("/primaries/zone_1", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();
        client
            .create("/primaries/zone_2", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();

        let config = LoadBalancerConfig::default();
        let mut pool = BackupPool::new();
        reconcile(&config, &client, &mut pool).await.unwrap();

        let zones: Vec<ZoneId> = pool.zones().copied().collect();
        assert_eq!(zones.len(), 2);
    }

    #[tokio::test]
    async fn reconcile_demotes_the_highest_zone_when_ratio_is_low() {
        let client: Arc<InMemoryCoordinationClient> = Arc::new(InMemoryCoordinationClient::new());
        client.ensure_path("/primaries").await.unwrap();
        client.ensure_path("/shared_state/publishers").await.unwrap();
        client.ensure_path("/shared_state/subscribers").await.unwrap();
        client
            .create("/primaries/zone_1", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();
        client
            .create("/primaries/zone_2", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();

        let config = LoadBalancerConfig {
            load_threshold: 3.0,
            ..Default::default()
        };
        let mut pool = BackupPool::new();
        reconcile(&config, &client, &mut pool).await.unwrap();
        assert_eq!(pool.zones().count(), 2);

        // no clients registered: clients / (zones - 1) == 0 <= threshold
        reconcile(&config, &client, &mut pool).await.unwrap();
        assert_eq!(pool.zones().count(), 1);
        assert_eq!(pool.highest_zone(), Some(ZoneId(1)));
    }

    #[tokio::test]
    async fn num_clients_counts_both_registries() {
        let client = InMemoryCoordinationClient::new();
        client.ensure_path("/shared_state/publishers").await.unwrap();
        client.ensure_path("/shared_state/subscribers").await.unwrap();
        client
            .create("/shared_state/publishers/p1", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();
        client
            .create("/shared_state/subscribers/s1", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();
        client
            .create("/shared_state/subscribers/s2", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();

        assert_eq!(num_clients(&client).await.unwrap(), 3);
    }
}
