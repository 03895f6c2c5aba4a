use coordination::CoordinationClient;
use primitives::{PrimaryEndpoint, ZoneId};
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// Picks a zone uniformly at random from `children(/primaries)` — the
/// subscriber's zone for life, same rule a publisher uses.
pub async fn pick_zone<C: CoordinationClient + ?Sized>(client: &C) -> Result<ZoneId> {
    let children = client.children("/primaries").await?;
    let zones: Vec<ZoneId> = children
        .iter()
        .filter_map(|name| ZoneId::parse_child_name(name))
        .collect();

    zones
        .choose(&mut rand::thread_rng())
        .copied()
        .ok_or(Error::NoZonesAvailable)
}

pub async fn read_primary<C: CoordinationClient + ?Sized>(
    client: &C,
    zone: ZoneId,
) -> Result<PrimaryEndpoint> {
    let data = client.get_data(&zone.primary_path()).await?;
    Ok(PrimaryEndpoint::decode(&data)?)
}
