use coordination::{CoordinationClient, CreateMode};
use telemetry::debug;

use crate::Result;

pub const CURRENT_LOAD_PATH: &str = "/shared_state/current_load";

/// `update_current_load()`: `(num_publishers + num_subscribers) / num_zones`,
/// recomputed and republished after every registration or disconnect so
/// `BackupPool` and `LoadBalancer` see a fresh value without polling the
/// registries themselves.
pub async fn update_current_load<C: CoordinationClient + ?Sized>(
    client: &C,
    num_publishers: usize,
    num_subscribers: usize,
) -> Result<()> {
    let num_zones = client.children("/primaries").await?.len().max(1);
    let load = (num_publishers + num_subscribers) as f64 / num_zones as f64;
    let data = load.to_string().into_bytes();

    if client.exists(CURRENT_LOAD_PATH).await? {
        client.set_data(CURRENT_LOAD_PATH, data).await?;
    } else {
        client
            .create(CURRENT_LOAD_PATH, data, CreateMode::Persistent)
            .await?;
    }

    debug!(load, num_zones, "current_load updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use coordination::InMemoryCoordinationClient;

    use super::*;

    #[tokio::test]
    async fn load_is_clients_divided_by_zones() {
        let client = InMemoryCoordinationClient::new();
        client.ensure_path("/primaries").await.unwrap();
        client
            .create(
                "/primaries/zone_1",
                Vec::new(),
                CreateMode::Persistent,
            )
            .await
            .unwrap();

        update_current_load(&client, 3, 1).await.unwrap();

        let data = client.get_data(CURRENT_LOAD_PATH).await.unwrap();
        let load: f64 = String::from_utf8(data).unwrap().parse().unwrap();
        assert_eq!(load, 4.0);
    }
}
