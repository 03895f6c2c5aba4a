use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persistent client identity. Survives broker reattachment and session
/// loss; only a fresh process restart mints a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A fresh globally-unique id minted by a broker at startup. Never reused
/// across a session loss — a broker that loses its session restarts with a
/// new `BrokerId` rather than resuming the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerId(String);

impl BrokerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BrokerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a shard of the overlay. Zones are numbered from 1; zone
/// numbers are never reused within a single coordination tree lifetime
/// because [`crate::ZoneId::next_after`] always hands out
/// `max(existing) + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub u32);

impl ZoneId {
    pub const FIRST: ZoneId = ZoneId(1);

    pub fn next_after(existing: impl IntoIterator<Item = ZoneId>) -> ZoneId {
        match existing.into_iter().max() {
            Some(ZoneId(n)) => ZoneId(n + 1),
            None => ZoneId::FIRST,
        }
    }

    /// `/primaries/zone_<N>`
    pub fn primary_path(self) -> String {
        format!("/primaries/zone_{}", self.0)
    }

    /// `/elections/zone_<N>`
    pub fn election_path(self) -> String {
        format!("/elections/zone_{}", self.0)
    }

    /// Parses a `zone_<N>` child name as produced by [`Self::primary_path`]
    /// and [`Self::election_path`].
    pub fn parse_child_name(name: &str) -> Option<ZoneId> {
        name.strip_prefix("zone_")?.parse::<u32>().ok().map(ZoneId)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone_{}", self.0)
    }
}

/// A topic string. Wrapped rather than left as a bare `String` so that
/// topic-keyed maps in brokers/publishers/subscribers read unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_paths_round_trip_through_child_names() {
        let zone = ZoneId(3);
        let path = zone.primary_path();
        let child_name = path.rsplit('/').next().unwrap();
        assert_eq!(ZoneId::parse_child_name(child_name), Some(zone));
    }

    #[test]
    fn next_after_picks_max_plus_one() {
        let zones = [ZoneId(1), ZoneId(3), ZoneId(2)];
        assert_eq!(ZoneId::next_after(zones), ZoneId(4));
    }

    #[test]
    fn next_after_empty_starts_at_one() {
        assert_eq!(ZoneId::next_after(Vec::<ZoneId>::new()), ZoneId::FIRST);
    }
}
