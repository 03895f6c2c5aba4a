use primitives::{ClientId, HistorySize, Topic};
use serde::{Deserialize, Serialize};

/// The JSON value written to `/shared_state/publishers/<id>` — the
/// coordinator-backed ground truth every broker's children-watch reads
/// back to reconstruct its in-memory `topic -> [publisher]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherRecord {
    pub address: String,
    pub topics: Vec<Topic>,
    pub offered: HistorySize,
    pub id: ClientId,
}

/// The JSON value written to `/shared_state/subscribers/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub address: String,
    pub topics: Vec<Topic>,
    pub requested: HistorySize,
    pub id: ClientId,
}

impl PublisherRecord {
    /// The dominance rule: a publisher only matches a subscriber if it
    /// offers at least as much history as the subscriber requests. Ties
    /// go to include.
    pub fn dominates(&self, requested: HistorySize) -> bool {
        self.offered >= requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_record_round_trips_through_json() {
        let record = PublisherRecord {
            address: "127.0.0.1:6000".to_string(),
            topics: vec![Topic::from("A"), Topic::from("B")],
            offered: 3,
            id: ClientId::from("pub-1".to_string()),
        };

        let json = serde_json::to_string(&record).unwrap();
        let decoded: PublisherRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn dominance_is_inclusive_of_ties() {
        let record = PublisherRecord {
            address: "127.0.0.1:6000".into(),
            topics: vec![],
            offered: 3,
            id: ClientId::from("pub-1".to_string()),
        };

        assert!(record.dominates(3));
        assert!(record.dominates(2));
        assert!(!record.dominates(4));
    }
}
