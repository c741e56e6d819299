// Item Queue
//
// Shared in-memory queue used by every multi-item provider. Deduplication
// against history happens at enqueue time; exclusion checks happen at
// dequeue time, so items excluded after they were queued are still
// skipped.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashSet, VecDeque};

use crate::models::MediaItem;
use crate::navigation::exclusion::ExclusionRegistry;

/// Queue length below which providers attempt a refill
pub const REFILL_THRESHOLD: usize = 10;

#[derive(Debug)]
pub struct ItemQueue {
    items: VecDeque<MediaItem>,
    capacity: usize,
}

impl ItemQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Whether a refill should run
    #[must_use]
    pub fn below_refill_threshold(&self) -> bool {
        self.items.len() < REFILL_THRESHOLD.min(self.capacity)
    }

    /// How many items a refill should request
    #[must_use]
    pub fn shortfall(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }

    /// Snapshot of queued ids, for duplicate filtering during refills
    #[must_use]
    pub fn id_set(&self) -> HashSet<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    /// Append unless the id is already queued. Returns whether the item
    /// was added.
    pub fn push_back(&mut self, item: MediaItem) -> bool {
        if self.contains_id(&item.id) {
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Put items at the front, preserving their relative order. Used for
    /// priority refill results and newly discovered files.
    pub fn prepend(&mut self, items: Vec<MediaItem>) {
        for item in items.into_iter().rev() {
            if !self.contains_id(&item.id) {
                self.items.push_front(item);
            }
        }
    }

    /// Pop the first item not in the exclusion registry; excluded entries
    /// are dropped on the way.
    pub fn pop_allowed(&mut self, exclusions: &ExclusionRegistry) -> Option<MediaItem> {
        while let Some(item) = self.items.pop_front() {
            if exclusions.contains(&item.id) {
                tracing::debug!(id = %item.id, "dropping excluded item at dequeue");
                continue;
            }
            return Some(item);
        }
        None
    }

    /// Front item after dropping excluded entries, without consuming it.
    pub fn peek_allowed(&mut self, exclusions: &ExclusionRegistry) -> Option<&MediaItem> {
        while let Some(item) = self.items.front() {
            if exclusions.contains(&item.id) {
                self.items.pop_front();
                continue;
            }
            break;
        }
        self.items.front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Fisher-Yates over the whole queue
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.items.make_contiguous().shuffle(rng);
    }

    #[must_use]
    pub fn first_id(&self) -> Option<String> {
        self.items.front().map(|item| item.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::exclusion::ExclusionReason;

    fn item(id: &str) -> MediaItem {
        MediaItem::from_id(id)
    }

    #[test]
    fn test_push_back_deduplicates() {
        let mut queue = ItemQueue::new(10);
        assert!(queue.push_back(item("/a.jpg")));
        assert!(!queue.push_back(item("/a.jpg")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_skips_excluded() {
        let exclusions = ExclusionRegistry::new();
        let mut queue = ItemQueue::new(10);
        queue.push_back(item("/a.jpg"));
        queue.push_back(item("/b.jpg"));
        exclusions.insert("/a.jpg", ExclusionReason::FileMissing);

        let next = queue.pop_allowed(&exclusions).unwrap();
        assert_eq!(next.id, "/b.jpg");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_prepend_preserves_order() {
        let mut queue = ItemQueue::new(10);
        queue.push_back(item("/old.jpg"));
        queue.prepend(vec![item("/p1.jpg"), item("/p2.jpg")]);
        assert_eq!(queue.first_id().as_deref(), Some("/p1.jpg"));
    }

    #[test]
    fn test_refill_threshold_respects_small_capacity() {
        // queueSize=1: refill fires on every consumption
        let mut queue = ItemQueue::new(1);
        assert!(queue.below_refill_threshold());
        queue.push_back(item("/a.jpg"));
        assert!(!queue.below_refill_threshold());
    }
}
