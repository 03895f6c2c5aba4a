use telemetry::debug;

use crate::{client::CreateMode, CoordinationClient, Result};

/// A candidacy in the leader-election recipe built on top of
/// ephemeral-sequential nodes: every candidate creates a node under the
/// election path, and the candidate holding the lowest sequence number is
/// the leader. A candidate that loses leadership (its node disappears,
/// e.g. because its session was lost) simply re-campaigns.
pub struct LeadershipHandle {
    election_path: String,
    my_path: String,
}

impl LeadershipHandle {
    pub fn my_path(&self) -> &str {
        &self.my_path
    }

    /// One-shot check: are we currently the leader?
    pub async fn is_leader<C: CoordinationClient + ?Sized>(&self, client: &C) -> Result<bool> {
        let children = client.children(&self.election_path).await?;
        let my_name = child_name(&self.my_path);
        Ok(children.iter().min() == Some(&my_name.to_string()))
    }

    /// Blocks until this candidate becomes the leader, re-checking
    /// whenever the election path's children change.
    pub async fn await_leadership<C: CoordinationClient + ?Sized>(
        &self,
        client: &C,
    ) -> Result<()> {
        loop {
            let mut watch = client.watch_children(&self.election_path).await?;

            if self.is_leader(client).await? {
                return Ok(());
            }

            if watch.changed().await.is_err() {
                // Election path itself vanished; nothing further to wait on.
                return Ok(());
            }
        }
    }

    /// Gives up the candidacy voluntarily, e.g. a primary stepping down on
    /// `SUSPENDED` to avoid split brain.
    pub async fn resign<C: CoordinationClient + ?Sized>(&self, client: &C) -> Result<()> {
        client.delete(&self.my_path).await
    }
}

fn child_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Enters a candidate into the election at `election_path` (created if
/// necessary) carrying `data` (typically the candidate's own connection
/// info, so other participants can read who's running without a separate
/// lookup).
pub async fn campaign<C: CoordinationClient + ?Sized>(
    client: &C,
    election_path: &str,
    data: Vec<u8>,
) -> Result<LeadershipHandle> {
    client.ensure_path(election_path).await?;

    let candidate_prefix = format!("{}/n_", election_path.trim_end_matches('/'));
    let my_path = client
        .create(&candidate_prefix, data, CreateMode::EphemeralSequential)
        .await?;

    debug!(%my_path, %election_path, "entered leader election");

    Ok(LeadershipHandle {
        election_path: election_path.trim_end_matches('/').to_string(),
        my_path,
    })
}

#[cfg(test)]
mod tests {
    use crate::memory::InMemoryCoordinationClient;

    use super::*;

    #[tokio::test]
    async fn first_candidate_is_immediately_leader() {
        let client = InMemoryCoordinationClient::new();

        let handle = campaign(&client, "/elections/zone_1", Vec::new())
            .await
            .unwrap();

        assert!(handle.is_leader(&client).await.unwrap());
    }

    #[tokio::test]
    async fn second_candidate_becomes_leader_after_first_resigns() {
        let client = InMemoryCoordinationClient::new();

        let first = campaign(&client, "/elections/zone_1", Vec::new())
            .await
            .unwrap();
        let second = campaign(&client, "/elections/zone_1", Vec::new())
            .await
            .unwrap();

        assert!(first.is_leader(&client).await.unwrap());
        assert!(!second.is_leader(&client).await.unwrap());

        first.resign(&client).await.unwrap();

        second.await_leadership(&client).await.unwrap();
        assert!(second.is_leader(&client).await.unwrap());
    }
}
