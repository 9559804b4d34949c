//! Types related to Raft log storage.
//!
//! Raft requires a backing store for entries of its replicated log. The [`Log`] trait is the
//! interface a [`State`](crate::core::State) is generic over; the trait boundary exists purely so
//! tests can swap in instrumented or adversarial logs, not to support a second backend in
//! production.
//!
//! A log is never empty: every implementation seeds a sentinel entry (`term=0, op=None`) at index
//! 1 on construction, so that `prev_log_index = 0` always has a well-defined term (`0`) to compare
//! against without a special case at the caller.

pub mod memory;

use crate::message::{LogEntry, LogIndex, Term};

/// Storage for a node's Raft log, indexed 1-based. Index `0` denotes "before the log" and always
/// compares as a virtual entry with `term = 0`.
pub trait Log {
    /// Returns the entry at 1-based index `index`, or `None` if `index` is past the end of the
    /// log. `index = 0` returns the virtual sentinel (`term = 0`) rather than `None`.
    fn get(&self, index: LogIndex) -> Option<LogEntry>;

    /// Appends a single entry at the tail of the log.
    fn append_one(&mut self, entry: LogEntry);

    /// Appends a sequence of entries at the tail of the log, in order.
    fn append_many(&mut self, entries: Vec<LogEntry>);

    /// Keeps only the first `len` entries, discarding everything after. A no-op if `len >=
    /// size()`.
    fn truncate_to(&mut self, len: u64);

    /// Returns the entries at indices `index..=size()`, in order. Returns an empty vector if
    /// `index > size()`. Panics if `index == 0` (there is no entry before index 1 to return).
    fn from(&self, index: LogIndex) -> Vec<LogEntry>;

    /// The number of entries in the log, including the sentinel.
    fn size(&self) -> u64;

    /// The term of the entry at `size()`, i.e. the most recently appended entry's term.
    fn last_term(&self) -> Term {
        self.get(LogIndex(self.size()))
            .expect("log is never empty")
            .term
    }
}
