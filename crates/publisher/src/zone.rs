use coordination::CoordinationClient;
use primitives::{PrimaryEndpoint, ZoneId};
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// Picks a zone uniformly at random from `children(/primaries)`. This is
/// the publisher's zone for life: it never re-picks after startup, even
/// across primary switches within that zone.
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

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use coordination::{CreateMode, InMemoryCoordinationClient};

    use super::*;

    #[tokio::test]
    async fn pick_zone_fails_with_no_primaries() {
        let client = InMemoryCoordinationClient::new();
        client.ensure_path("/primaries").await.unwrap();

        assert!(matches!(pick_zone(&client).await, Err(Error::NoZonesAvailable)));
    }

    #[tokio::test]
    async fn pick_zone_only_returns_existing_zones() {
        let client = InMemoryCoordinationClient::new();
        client.ensure_path("/primaries").await.unwrap();
        client
            .create("/primaries/zone_2", Vec::new(), CreateMode::Persistent)
            .await
            .unwrap();

        assert_eq!(pick_zone(&client).await.unwrap(), ZoneId(2));
    }

    #[tokio::test]
    async fn read_primary_decodes_the_endpoint_znode() {
        let client = InMemoryCoordinationClient::new();
        client.ensure_path("/primaries").await.unwrap();

        let endpoint = PrimaryEndpoint {
            host: "127.0.0.1".parse::<IpAddr>().unwrap(),
            pub_reg_port: 5555,
            sub_reg_port: 5556,
        };
        client
            .create("/primaries/zone_1", endpoint.encode(), CreateMode::Persistent)
            .await
            .unwrap();

        let decoded = read_primary(&client, ZoneId::FIRST).await.unwrap();
        assert_eq!(decoded, endpoint);
    }
}
