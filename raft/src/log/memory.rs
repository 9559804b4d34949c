//! An in-memory [`Log`] implementation backed by a growable `Vec`.

use crate::message::{LogEntry, LogIndex, Term};

use super::Log;

/// An in-memory Raft log. Entry at 1-based index `i` lives at `entries[i - 1]`; the sentinel
/// seeded at construction occupies index 1.
#[derive(Clone, Debug)]
pub struct InMemoryLog {
    entries: Vec<LogEntry>,
}

impl InMemoryLog {
    /// Constructs a log containing only the index-1 sentinel entry.
    pub fn new() -> Self {
        Self {
            entries: vec![LogEntry::sentinel()],
        }
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for InMemoryLog {
    fn get(&self, index: LogIndex) -> Option<LogEntry> {
        if index == LogIndex::ZERO {
            return Some(LogEntry {
                term: Term::ZERO,
                op: None,
            });
        }
        self.entries.get((index.0 - 1) as usize).cloned()
    }

    fn append_one(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    fn append_many(&mut self, entries: Vec<LogEntry>) {
        self.entries.extend(entries);
    }

    fn truncate_to(&mut self, len: u64) {
        if (len as usize) < self.entries.len() {
            self.entries.truncate(len as usize);
        }
    }

    fn from(&self, index: LogIndex) -> Vec<LogEntry> {
        assert!(index.0 >= 1, "from() requires a 1-based index");
        let start = (index.0 - 1) as usize;
        if start >= self.entries.len() {
            return Vec::new();
        }
        self.entries[start..].to_vec()
    }

    fn size(&self) -> u64 {
        self.entries.len() as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{ClientOp, ClientOpKind};

    fn entry(term: u64) -> LogEntry {
        LogEntry {
            term: Term(term),
            op: Some(ClientOp {
                client: "c1".into(),
                msg_id: 1,
                kind: ClientOpKind::Write {
                    key: "k".into(),
                    value: "v".into(),
                },
            }),
        }
    }

    #[test]
    fn starts_with_sentinel_only() {
        let log = InMemoryLog::new();
        assert_eq!(log.size(), 1);
        assert_eq!(log.last_term(), Term::ZERO);
        assert_eq!(log.get(LogIndex::ZERO).unwrap().term, Term::ZERO);
    }

    #[test]
    fn append_one_and_get() {
        let mut log = InMemoryLog::new();
        log.append_one(entry(1));
        assert_eq!(log.size(), 2);
        assert_eq!(log.get(LogIndex(2)).unwrap().term, Term(1));
        assert_eq!(log.last_term(), Term(1));
    }

    #[test]
    fn get_past_end_is_none() {
        let log = InMemoryLog::new();
        assert!(log.get(LogIndex(5)).is_none());
    }

    #[test]
    fn append_many_extends_tail() {
        let mut log = InMemoryLog::new();
        log.append_many(vec![entry(1), entry(1), entry(2)]);
        assert_eq!(log.size(), 4);
        assert_eq!(log.get(LogIndex(4)).unwrap().term, Term(2));
    }

    #[test]
    fn truncate_to_keeps_prefix() {
        let mut log = InMemoryLog::new();
        log.append_many(vec![entry(1), entry(1), entry(2)]);
        log.truncate_to(2);
        assert_eq!(log.size(), 2);
        assert_eq!(log.last_term(), Term(1));
    }

    #[test]
    fn truncate_to_past_end_is_noop() {
        let mut log = InMemoryLog::new();
        log.append_one(entry(1));
        log.truncate_to(10);
        assert_eq!(log.size(), 2);
    }

    #[test]
    fn from_returns_suffix() {
        let mut log = InMemoryLog::new();
        log.append_many(vec![entry(1), entry(2)]);
        let suffix = log.from(LogIndex(2));
        assert_eq!(suffix.len(), 2);
        assert_eq!(suffix[0].term, Term(1));
    }

    #[test]
    fn from_past_end_is_empty() {
        let log = InMemoryLog::new();
        assert!(log.from(LogIndex(log.size() + 1)).is_empty());
    }

    #[test]
    #[should_panic]
    fn from_zero_panics() {
        let log = InMemoryLog::new();
        let _ = log.from(LogIndex::ZERO);
    }
}
