//! The buffer of pending records

use serde::{Deserialize, Serialize};

use crate::types::ErrorRecord;

/// Where a record landed after [`Buffer::merge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    /// Position of the buffered record
    pub index: usize,
    /// True when the record was appended, false when an existing one was counted
    pub is_new: bool,
}

/// Insertion-ordered records that have not been delivered yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buffer {
    records: Vec<ErrorRecord>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a buffer from previously persisted records
    pub fn from_records(records: Vec<ErrorRecord>) -> Self {
        Self { records }
    }

    /// Count `record` against an existing entry with the same identity key, or
    /// append it.
    ///
    /// A counted duplicate keeps the timestamp and stack of its first occurrence.
    pub fn merge(&mut self, record: ErrorRecord) -> Merge {
        let key = record.identity_key();

        match self.records.iter().position(|r| r.identity_key() == key) {
            Some(index) => {
                let existing = &mut self.records[index];
                existing.occurrences = existing.occurrences.saturating_add(1);
                Merge {
                    index,
                    is_new: false,
                }
            }
            None => {
                self.records.push(record);
                Merge {
                    index: self.records.len() - 1,
                    is_new: true,
                }
            }
        }
    }

    /// Remove what a successful flush delivered.
    ///
    /// Each delivered record reduces the live record with the same identity key
    /// by the delivered occurrence count. Records that drop to zero are removed;
    /// records appended or re-observed after the snapshot was taken keep their
    /// undelivered remainder. Returns the number of records removed.
    pub fn acknowledge(&mut self, delivered: &[ErrorRecord]) -> usize {
        let before = self.records.len();

        for sent in delivered {
            let key = sent.identity_key();
            if let Some(live) = self.records.iter_mut().find(|r| r.identity_key() == key) {
                live.occurrences = live.occurrences.saturating_sub(sent.occurrences);
            }
        }
        self.records.retain(|r| r.occurrences > 0);

        before - self.records.len()
    }

    /// Owned copy of the current records, in order
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.records.clone()
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&ErrorRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total occurrences across all records
    pub fn total_occurrences(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.occurrences)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str, lineno: u32, colno: u32) -> ErrorRecord {
        ErrorRecord {
            message: message.to_string(),
            filename: "app.js".to_string(),
            lineno,
            colno,
            stack: None,
            timestamp: 1_000,
            occurrences: 1,
        }
    }

    #[test]
    fn test_merge_counts_same_line_once() {
        let mut buffer = Buffer::new();

        let first = buffer.merge(record("boom", 10, 1));
        let mut second_record = record("boom", 10, 2);
        second_record.timestamp = 2_000;
        second_record.stack = Some("later stack".to_string());
        let second = buffer.merge(second_record);

        assert_eq!(first, Merge { index: 0, is_new: true });
        assert_eq!(second, Merge { index: 0, is_new: false });
        assert_eq!(buffer.len(), 1);

        let kept = buffer.get(0).unwrap();
        assert_eq!(kept.occurrences, 2);
        assert_eq!(kept.timestamp, 1_000);
        assert_eq!(kept.colno, 1);
        assert_eq!(kept.stack, None);
    }

    #[test]
    fn test_merge_keeps_different_lines_apart() {
        let mut buffer = Buffer::new();
        buffer.merge(record("boom", 10, 1));
        let merge = buffer.merge(record("boom", 11, 1));

        assert_eq!(merge, Merge { index: 1, is_new: true });
        assert_eq!(buffer.len(), 2);
        assert!(buffer.records().iter().all(|r| r.occurrences == 1));
    }

    #[test]
    fn test_acknowledge_removes_delivered_records() {
        let mut buffer = Buffer::new();
        buffer.merge(record("a", 1, 1));
        buffer.merge(record("b", 2, 1));
        let sent = buffer.snapshot();

        assert_eq!(buffer.acknowledge(&sent), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_acknowledge_keeps_records_added_after_snapshot() {
        let mut buffer = Buffer::new();
        buffer.merge(record("a", 1, 1));
        let sent = buffer.snapshot();

        // In flight: one more "a" and a brand new "b"
        buffer.merge(record("a", 1, 1));
        buffer.merge(record("b", 2, 1));

        assert_eq!(buffer.acknowledge(&sent), 0);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.get(0).unwrap().message, "a");
        assert_eq!(buffer.get(0).unwrap().occurrences, 1);
        assert_eq!(buffer.get(1).unwrap().message, "b");
        assert_eq!(buffer.total_occurrences(), 2);
    }

    #[test]
    fn test_acknowledge_unknown_records_is_noop() {
        let mut buffer = Buffer::new();
        buffer.merge(record("a", 1, 1));

        assert_eq!(buffer.acknowledge(&[record("z", 9, 9)]), 0);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_buffer_serializes_as_array() {
        let mut buffer = Buffer::new();
        buffer.merge(record("a", 1, 1));

        let json = serde_json::to_string(&buffer).unwrap();
        assert!(json.starts_with('['));

        let restored: Buffer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, buffer);
    }
}
