//! Dispatched, unconfirmed delivery tags and the ids they carry.
//!
//! A cumulative ack confirms a whole prefix of the tags, so they live in a
//! `BTreeMap`: removing everything up to a tag is a single `split_off`
//! instead of a scan. Each tag keeps the sequence id it was dispatched for,
//! because confirms name channel tags while the confirmed frontier is
//! counted in sequence ids, and the two need not line up.
//!
//! Tags are inserted in dispatch order and the channel hands them out in
//! increasing order, so the lowest tag always carries the lowest open id.

use std::collections::BTreeMap;

use pacer_core::{DeliveryTag, SequenceId};

/// Tags in flight on the channel.
#[derive(Debug, Default, Clone)]
pub struct OpenTagSet {
    tags: BTreeMap<DeliveryTag, SequenceId>,
}

impl OpenTagSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tags: BTreeMap::new(),
        }
    }

    /// Records a dispatched tag. Returns false if it was already open.
    pub fn insert(&mut self, tag: DeliveryTag, sequence_id: SequenceId) -> bool {
        if self.tags.contains_key(&tag) {
            return false;
        }
        self.tags.insert(tag, sequence_id);
        true
    }

    /// Removes a single tag. Returns false if it was not open.
    pub fn remove(&mut self, tag: DeliveryTag) -> bool {
        self.tags.remove(&tag).is_some()
    }

    /// Removes every tag `<= tag`, leaving higher tags untouched.
    ///
    /// Returns the number of tags removed.
    pub fn remove_through(&mut self, tag: DeliveryTag) -> usize {
        let Some(bound) = tag.get().checked_add(1) else {
            let removed = self.tags.len();
            self.tags.clear();
            return removed;
        };
        let above = self.tags.split_off(&DeliveryTag::new(bound));
        std::mem::replace(&mut self.tags, above).len()
    }

    /// Returns the sequence id of the oldest message still in flight.
    #[must_use]
    pub fn oldest_sequence(&self) -> Option<SequenceId> {
        self.tags.first_key_value().map(|(_, &sequence_id)| sequence_id)
    }

    /// Returns the number of open tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates open tags, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = DeliveryTag> + '_ {
        self.tags.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(tags: &[u64]) -> OpenTagSet {
        let mut set = OpenTagSet::new();
        for &tag in tags {
            set.insert(DeliveryTag::new(tag), SequenceId::new(tag));
        }
        set
    }

    fn raw(set: &OpenTagSet) -> Vec<u64> {
        set.iter().map(DeliveryTag::get).collect()
    }

    #[test]
    fn test_remove_through_prefix() {
        let mut set = set_of(&[2, 3, 5, 8, 9]);
        assert_eq!(set.remove_through(DeliveryTag::new(5)), 3);
        assert_eq!(raw(&set), vec![8, 9]);
    }

    #[test]
    fn test_remove_through_between_tags() {
        let mut set = set_of(&[2, 4, 6]);
        assert_eq!(set.remove_through(DeliveryTag::new(3)), 1);
        assert_eq!(raw(&set), vec![4, 6]);
    }

    #[test]
    fn test_remove_through_below_everything() {
        let mut set = set_of(&[10, 11]);
        assert_eq!(set.remove_through(DeliveryTag::new(9)), 0);
        assert_eq!(raw(&set), vec![10, 11]);
    }

    #[test]
    fn test_remove_through_max_clears() {
        let mut set = set_of(&[1, u64::MAX]);
        assert_eq!(set.remove_through(DeliveryTag::new(u64::MAX)), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn test_single_remove() {
        let mut set = set_of(&[1, 2, 3]);
        assert!(set.remove(DeliveryTag::new(2)));
        assert!(!set.remove(DeliveryTag::new(2)));
        assert_eq!(raw(&set), vec![1, 3]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_duplicate_insert_keeps_first_id() {
        let mut set = OpenTagSet::new();
        assert!(set.insert(DeliveryTag::new(1), SequenceId::new(1)));
        assert!(!set.insert(DeliveryTag::new(1), SequenceId::new(2)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.oldest_sequence(), Some(SequenceId::new(1)));
    }

    #[test]
    fn test_oldest_sequence_follows_skewed_tags() {
        let mut set = OpenTagSet::new();
        for id in 1..=3 {
            set.insert(DeliveryTag::new(id + 10), SequenceId::new(id));
        }
        assert_eq!(set.oldest_sequence(), Some(SequenceId::new(1)));

        assert!(set.remove(DeliveryTag::new(11)));
        assert_eq!(set.oldest_sequence(), Some(SequenceId::new(2)));

        assert_eq!(set.remove_through(DeliveryTag::new(13)), 2);
        assert_eq!(set.oldest_sequence(), None);
    }
}
