use std::{collections::HashMap, sync::Arc};

use broker::Broker;
use coordination::CoordinationClient;
use overlay_config::{BrokerConfig, LoadBalancerConfig};
use primitives::ZoneId;
use telemetry::{error, info};
use tokio::task::JoinHandle;

/// The load balancer's own maintained backup pool: for each zone
/// currently present under `/primaries`, at most one spare [`Broker`]
/// contending in that zone's election but never (yet) winning it, so
/// that a primary failure is covered by a contender that is already
/// running rather than one that has to be started from cold.
#[derive(Default)]
pub struct BackupPool {
    standbys: HashMap<ZoneId, JoinHandle<()>>,
}

impl BackupPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zones(&self) -> impl Iterator<Item = &ZoneId> {
        self.standbys.keys()
    }

    /// Promotion readiness: spawns a spare contender for `zone` if one
    /// isn't already running. The spawned broker blocks in its own
    /// election exactly like any other contender; it only starts serving
    /// once the current primary steps down, which is the promotion this
    /// method prepares for, not performs.
    pub fn ensure_backup<C: CoordinationClient + 'static>(
        &mut self,
        zone: ZoneId,
        config: &LoadBalancerConfig,
        coordination: &Arc<C>,
    ) {
        if self.standbys.contains_key(&zone) {
            return;
        }

        let broker_config = BrokerConfig {
            zone,
            centralized: config.centralized,
            ..BrokerConfig::default()
        };
        let broker = Broker::new(broker_config, Arc::clone(coordination));
        let broker_id = broker.id().to_string();

        let handle = tokio::spawn(async move {
            if let Err(err) = broker.run().await {
                error!(%err, broker_id, "standby broker exited with an error");
            }
        });

        info!(%zone, "load balancer is now maintaining a standby broker for this zone");
        self.standbys.insert(zone, handle);
    }

    /// Demotion: retires the standby maintained for `zone`, if any. If the
    /// standby has already been promoted to primary (the only contender
    /// left), this simply stops replacing it should it later fail — the
    /// load balancer never tears down an active primary's sockets itself.
    pub fn retire_backup(&mut self, zone: ZoneId) {
        if let Some(handle) = self.standbys.remove(&zone) {
            handle.abort();
            info!(%zone, "load balancer retired its standby broker for this zone");
        }
    }

    pub fn highest_zone(&self) -> Option<ZoneId> {
        self.standbys.keys().copied().max()
    }
}
