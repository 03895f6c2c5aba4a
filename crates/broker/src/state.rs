use std::collections::{HashMap, HashSet};

use events::{PublisherRecord, SubscriberRecord};
use primitives::{ClientId, Topic};

/// The broker's in-memory registry, reconstructed entirely from
/// coordinator data: per-topic id sets plus the full record per id. A
/// broker never stores a direct reference to a publisher/subscriber
/// object, only these serialized records keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    publishers: HashMap<ClientId, PublisherRecord>,
    subscribers: HashMap<ClientId, SubscriberRecord>,
    topic_publishers: HashMap<Topic, HashSet<ClientId>>,
    topic_subscribers: HashMap<Topic, HashSet<ClientId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publisher_ids(&self) -> impl Iterator<Item = &ClientId> {
        self.publishers.keys()
    }

    pub fn subscriber_ids(&self) -> impl Iterator<Item = &ClientId> {
        self.subscribers.keys()
    }

    pub fn publisher(&self, id: &ClientId) -> Option<&PublisherRecord> {
        self.publishers.get(id)
    }

    pub fn subscriber(&self, id: &ClientId) -> Option<&SubscriberRecord> {
        self.subscribers.get(id)
    }

    pub fn num_publishers(&self) -> usize {
        self.publishers.len()
    }

    pub fn num_subscribers(&self) -> usize {
        self.subscribers.len()
    }

    /// Adds (or re-registers, tolerating a duplicate id as the design
    /// requires) a publisher into every per-topic set it lists. A
    /// re-registration that drops a topic the id previously held is
    /// removed from that topic's set, so a narrowed topic list can't
    /// leave a stale id behind for `dominant_publishers` to return.
    pub fn insert_publisher(&mut self, record: PublisherRecord) {
        if let Some(previous) = self.publishers.get(&record.id) {
            for topic in &previous.topics {
                if !record.topics.contains(topic) {
                    if let Some(set) = self.topic_publishers.get_mut(topic) {
                        set.remove(&record.id);
                        if set.is_empty() {
                            self.topic_publishers.remove(topic);
                        }
                    }
                }
            }
        }

        for topic in &record.topics {
            self.topic_publishers
                .entry(topic.clone())
                .or_default()
                .insert(record.id.clone());
        }
        self.publishers.insert(record.id.clone(), record);
    }

    pub fn remove_publisher(&mut self, id: &ClientId) -> Option<PublisherRecord> {
        let record = self.publishers.remove(id)?;
        for topic in &record.topics {
            if let Some(set) = self.topic_publishers.get_mut(topic) {
                set.remove(id);
                if set.is_empty() {
                    self.topic_publishers.remove(topic);
                }
            }
        }
        Some(record)
    }

    /// Same stale-topic cleanup as [`Self::insert_publisher`], applied to
    /// the subscriber side.
    pub fn insert_subscriber(&mut self, record: SubscriberRecord) {
        if let Some(previous) = self.subscribers.get(&record.id) {
            for topic in &previous.topics {
                if !record.topics.contains(topic) {
                    if let Some(set) = self.topic_subscribers.get_mut(topic) {
                        set.remove(&record.id);
                        if set.is_empty() {
                            self.topic_subscribers.remove(topic);
                        }
                    }
                }
            }
        }

        for topic in &record.topics {
            self.topic_subscribers
                .entry(topic.clone())
                .or_default()
                .insert(record.id.clone());
        }
        self.subscribers.insert(record.id.clone(), record);
    }

    pub fn remove_subscriber(&mut self, id: &ClientId) -> Option<SubscriberRecord> {
        let record = self.subscribers.remove(id)?;
        for topic in &record.topics {
            if let Some(set) = self.topic_subscribers.get_mut(topic) {
                set.remove(id);
                if set.is_empty() {
                    self.topic_subscribers.remove(topic);
                }
            }
        }
        Some(record)
    }

    /// Publishers registered for `topic` whose `offered` dominates
    /// `requested` — the dominance-filtered address list a newly
    /// registered subscriber receives, or the set notified of a new
    /// publisher arrival.
    pub fn dominant_publishers(&self, topic: &Topic, requested: usize) -> Vec<&PublisherRecord> {
        self.topic_publishers
            .get(topic)
            .into_iter()
            .flatten()
            .filter_map(|id| self.publishers.get(id))
            .filter(|record| record.dominates(requested))
            .collect()
    }

    /// Subscribers registered for `topic` whose `requested` is dominated
    /// by `offered` — used to gate the new-publisher notification fan-out.
    pub fn dominated_subscribers(&self, topic: &Topic, offered: usize) -> Vec<&SubscriberRecord> {
        self.topic_subscribers
            .get(topic)
            .into_iter()
            .flatten()
            .filter_map(|id| self.subscribers.get(id))
            .filter(|record| offered >= record.requested)
            .collect()
    }

    pub fn topics_with_publishers(&self) -> impl Iterator<Item = &Topic> {
        self.topic_publishers.keys()
    }

    pub fn has_publishers_for(&self, topic: &Topic) -> bool {
        self.topic_publishers
            .get(topic)
            .is_some_and(|set| !set.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(id: &str, topics: &[&str], offered: usize) -> PublisherRecord {
        PublisherRecord {
            address: format!("127.0.0.1:600{id}"),
            topics: topics.iter().map(|t| Topic::from(*t)).collect(),
            offered,
            id: ClientId::from(id.to_string()),
        }
    }

    fn subscriber(id: &str, topics: &[&str], requested: usize) -> SubscriberRecord {
        SubscriberRecord {
            address: format!("127.0.0.1:700{id}"),
            topics: topics.iter().map(|t| Topic::from(*t)).collect(),
            requested,
            id: ClientId::from(id.to_string()),
        }
    }

    #[test]
    fn dominant_publishers_excludes_those_offering_less_than_requested() {
        let mut registry = Registry::new();
        registry.insert_publisher(publisher("1", &["A"], 1));
        registry.insert_publisher(publisher("2", &["A"], 3));

        let matches = registry.dominant_publishers(&Topic::from("A"), 3);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id.as_str(), "2");
    }

    #[test]
    fn ties_are_included() {
        let mut registry = Registry::new();
        registry.insert_publisher(publisher("1", &["A"], 2));

        assert_eq!(registry.dominant_publishers(&Topic::from("A"), 2).len(), 1);
    }

    #[test]
    fn removing_a_publisher_clears_empty_topic_sets() {
        let mut registry = Registry::new();
        registry.insert_publisher(publisher("1", &["A"], 1));
        registry.remove_publisher(&ClientId::from("1".to_string()));

        assert!(registry.topics_with_publishers().next().is_none());
    }

    #[test]
    fn re_registering_the_same_id_tolerates_duplicates() {
        let mut registry = Registry::new();
        registry.insert_publisher(publisher("1", &["A"], 1));
        registry.insert_publisher(publisher("1", &["A", "B"], 2));

        assert_eq!(registry.num_publishers(), 1);
        assert_eq!(registry.publisher(&ClientId::from("1".to_string())).unwrap().offered, 2);
    }

    #[test]
    fn re_registering_with_a_narrowed_topic_list_drops_the_stale_topic_entry() {
        let mut registry = Registry::new();
        registry.insert_publisher(publisher("1", &["A", "B"], 1));
        registry.insert_publisher(publisher("1", &["A"], 1));

        assert!(registry.dominant_publishers(&Topic::from("B"), 1).is_empty());
        assert!(!registry.has_publishers_for(&Topic::from("B")));
        assert_eq!(registry.dominant_publishers(&Topic::from("A"), 1).len(), 1);
    }

    #[test]
    fn re_registering_a_subscriber_with_a_narrowed_topic_list_drops_the_stale_topic_entry() {
        let mut registry = Registry::new();
        registry.insert_subscriber(subscriber("1", &["A", "B"], 1));
        registry.insert_subscriber(subscriber("1", &["A"], 1));

        assert!(registry.dominated_subscribers(&Topic::from("B"), 5).is_empty());
        assert_eq!(registry.dominated_subscribers(&Topic::from("A"), 5).len(), 1);
    }
}
