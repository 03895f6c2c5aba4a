use std::collections::VecDeque;

use primitives::{HistorySize, Topic};
use serde::{Deserialize, Serialize};

/// One published event, exactly the shape carried in the sliding-history
/// payload: `{"publisher":...,"topic":...,"publish_time":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub publisher: String,
    pub topic: Topic,
    /// Seconds since `UNIX_EPOCH`, matching the original's `time.time()`
    /// based timestamps; a `f64` accommodates sub-second precision.
    pub publish_time: f64,
}

/// A publisher's bounded FIFO of its last `offered` events. Broadcast in
/// full with every message so a late-joining subscriber with
/// `requested <= offered` can recover a tail of recent events from a
/// single delivered message; its length never exceeds `offered`.
#[derive(Debug, Clone, Default)]
pub struct SlidingHistory {
    capacity: HistorySize,
    events: VecDeque<EventRecord>,
}

impl SlidingHistory {
    pub fn new(capacity: HistorySize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, event: EventRecord) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn as_slice(&self) -> Vec<EventRecord> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A subscriber's view of one received record, appended to its log:
/// `{"publisher":...,"topic":...,"total_time_seconds":...}` — the CSV
/// columns of the finite-mode received-log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedRecord {
    pub publisher: String,
    pub topic: Topic,
    pub total_time_seconds: f64,
}

/// Selects the tail of a delivered history payload a subscriber should
/// keep: `min(requested, len(history))` most-recent records, in the order
/// they were published.
pub fn select_tail(history: &[EventRecord], requested: HistorySize) -> &[EventRecord] {
    let take = requested.min(history.len());
    &history[history.len() - take..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(topic: &str, publish_time: f64) -> EventRecord {
        EventRecord {
            publisher: "127.0.0.1:6000".to_string(),
            topic: Topic::from(topic),
            publish_time,
        }
    }

    #[test]
    fn sliding_history_evicts_oldest_once_full() {
        let mut history = SlidingHistory::new(2);
        history.push(record("A", 1.0));
        history.push(record("A", 2.0));
        history.push(record("A", 3.0));

        let events = history.as_slice();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].publish_time, 2.0);
        assert_eq!(events[1].publish_time, 3.0);
    }

    #[test]
    fn select_tail_never_exceeds_requested_or_available() {
        let history = vec![record("A", 1.0), record("A", 2.0), record("A", 3.0)];

        assert_eq!(select_tail(&history, 2).len(), 2);
        assert_eq!(select_tail(&history, 10).len(), 3);
        assert_eq!(select_tail(&history, 2)[1].publish_time, 3.0);
    }
}
