//! Bounded FIFO log of received messages.

use crate::domain::types::MessageRecord;
use std::collections::VecDeque;

/// Number of records kept when no capacity is configured.
pub const DEFAULT_LOG_CAPACITY: usize = 10;

/// Append-only log that evicts its oldest records past `capacity`.
#[derive(Debug, Clone)]
pub struct MessageLog {
    records: VecDeque<MessageRecord>,
    capacity: usize,
}

impl MessageLog {
    /// Create a log holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a record and evict down to capacity.
    ///
    /// Returns how many records were evicted.
    pub fn append(&mut self, record: MessageRecord) -> usize {
        self.records.push_back(record);
        self.trim()
    }

    /// Drop records from the front while the log is over capacity.
    pub fn trim(&mut self) -> usize {
        let mut evicted = 0;
        while self.records.len() > self.capacity {
            self.records.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Oldest-first snapshot.
    pub fn list(&self) -> Vec<MessageRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> MessageRecord {
        MessageRecord {
            encrypted_text: format!("m{}", n),
            decrypted_text: None,
            timestamp: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_keeps_last_ten_in_order() {
        let mut log = MessageLog::default();
        for n in 0..25 {
            log.append(record(n));
            assert!(log.len() <= DEFAULT_LOG_CAPACITY);
        }

        let texts: Vec<_> = log.list().into_iter().map(|r| r.encrypted_text).collect();
        let expected: Vec<_> = (15..25).map(|n| format!("m{}", n)).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_append_reports_evictions() {
        let mut log = MessageLog::new(2);
        assert_eq!(log.append(record(0)), 0);
        assert_eq!(log.append(record(1)), 0);
        assert_eq!(log.append(record(2)), 1);
        assert_eq!(log.list()[0].encrypted_text, "m1");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = MessageLog::new(0);
        log.append(record(0));
        log.append(record(1));
        assert_eq!(log.len(), 1);
        assert_eq!(log.list()[0].encrypted_text, "m1");
    }

    #[test]
    fn test_empty_log() {
        let log = MessageLog::default();
        assert!(log.is_empty());
        assert!(log.list().is_empty());
    }
}
