//! The Pending Buffer: changes accumulated for a `(tree, locale)` pair since
//! the last flush.

use std::collections::BTreeMap;

use crate::change::Change;

/// Key identifying one pending comparison: a tree name plus a locale code.
pub type PendingKey = (String, String);

/// Accumulates changes per `(tree, locale)` until the next flush drains it.
///
/// `BTreeMap` gives deterministic iteration order for tests; §5's ordering
/// guarantees only promise "one submission per key", not a specific order,
/// so this is a implementation convenience rather than a contract.
#[derive(Debug, Default)]
pub struct PendingBuffer {
    entries: BTreeMap<PendingKey, Vec<Change>>,
}

impl PendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `changes` to the buffer for `(tree, locale)`, preserving
    /// insertion order within the key.
    pub fn push(&mut self, tree: &str, locale: &str, changes: impl IntoIterator<Item = Change>) {
        let key = (tree.to_string(), locale.to_string());
        self.entries.entry(key).or_default().extend(changes);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, tree: &str, locale: &str) -> Option<&[Change]> {
        self.entries
            .get(&(tree.to_string(), locale.to_string()))
            .map(Vec::as_slice)
    }

    /// Snapshots and clears the buffer atomically (from the dispatcher's
    /// point of view — this crate is single-threaded so "atomically" just
    /// means "in one call with no intervening push").
    pub fn drain(&mut self) -> BTreeMap<PendingKey, Vec<Change>> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(n: u64) -> Change {
        Change::new(n, "l10n-test", vec!["file.dtd".into()])
    }

    #[test]
    fn push_accumulates_in_order() {
        let mut buffer = PendingBuffer::new();
        buffer.push("test", "de", vec![change(1)]);
        buffer.push("test", "de", vec![change(2)]);

        let entries = buffer.get("test", "de").unwrap();
        assert_eq!(entries.iter().map(|c| c.number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut buffer = PendingBuffer::new();
        buffer.push("test", "de", vec![change(1)]);
        buffer.push("test", "fr", vec![change(2)]);

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn distinct_keys_stay_separate() {
        let mut buffer = PendingBuffer::new();
        buffer.push("test", "de", vec![change(1)]);
        buffer.push("other", "de", vec![change(2)]);
        assert_eq!(buffer.len(), 2);
    }
}
