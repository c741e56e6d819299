//! Navigation history: the ordered record of displayed items plus a
//! cursor. Items after the cursor form the forward redo stack; trimming
//! only ever eats from behind the cursor so retreat targets survive.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::models::MediaItem;
use crate::provider::traits::HistoryView;

#[derive(Debug)]
pub struct History {
    items: Vec<MediaItem>,
    position: Option<usize>,
    bound: usize,
}

impl History {
    #[must_use]
    pub fn new(bound: usize) -> Self {
        Self {
            items: Vec::new(),
            position: None,
            bound: bound.max(1),
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
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    #[must_use]
    pub fn current(&self) -> Option<&MediaItem> {
        self.items.get(self.position?)
    }

    #[must_use]
    pub fn can_retreat(&self) -> bool {
        self.position.is_some_and(|p| p > 0)
    }

    /// Whether there are redo items ahead of the cursor
    #[must_use]
    pub fn has_forward(&self) -> bool {
        self.position
            .is_some_and(|p| p + 1 < self.items.len())
    }

    /// Append a freshly dequeued item and move the cursor onto it.
    pub fn push(&mut self, item: MediaItem) {
        self.items.push(item);
        self.position = Some(self.items.len() - 1);
        self.trim();
    }

    /// Move forward through the redo stack; `None` when already at the
    /// end (the caller should dequeue a fresh item instead).
    pub fn advance_replay(&mut self) -> Option<MediaItem> {
        if self.has_forward() {
            let next = self.position.map_or(0, |p| p + 1);
            self.position = Some(next);
            return self.items.get(next).cloned();
        }
        None
    }

    /// Move back one step; `None` when at the beginning (no-op).
    pub fn retreat(&mut self) -> Option<MediaItem> {
        let position = self.position?;
        if position == 0 {
            return None;
        }
        self.position = Some(position - 1);
        self.items.get(position - 1).cloned()
    }

    /// Drop an item wherever it sits, keeping the cursor on the same
    /// logical entry so retreat never lands on a known-bad item.
    pub fn remove_id(&mut self, id: &str) -> bool {
        let Some(index) = self.items.iter().position(|item| item.id == id) else {
            return false;
        };
        self.items.remove(index);
        self.position = match self.position {
            None => None,
            Some(_) if self.items.is_empty() => None,
            Some(p) if index <= p => Some(p.saturating_sub(1)),
            Some(p) => Some(p),
        };
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.position = None;
    }

    /// Trim the oldest entries over the bound, but only from behind the
    /// cursor.
    fn trim(&mut self) {
        while self.items.len() > self.bound {
            match self.position {
                Some(p) if p > 0 => {
                    self.items.remove(0);
                    self.position = Some(p - 1);
                }
                _ => break,
            }
        }
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    #[must_use]
    pub fn contains_id(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
    }
}

/// Cheaply clonable handle shared between the controller (writer) and the
/// providers (readers, through [`HistoryView`]).
#[derive(Debug, Clone)]
pub struct SharedHistory(Arc<RwLock<History>>);

impl SharedHistory {
    #[must_use]
    pub fn new(bound: usize) -> Self {
        Self(Arc::new(RwLock::new(History::new(bound))))
    }

    pub fn with<R>(&self, f: impl FnOnce(&History) -> R) -> R {
        f(&self.0.read())
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut History) -> R) -> R {
        f(&mut self.0.write())
    }

    #[must_use]
    pub fn view(&self) -> Arc<dyn HistoryView> {
        Arc::new(Self(self.0.clone()))
    }
}

impl HistoryView for SharedHistory {
    fn contains_id(&self, id: &str) -> bool {
        self.0.read().contains_id(id)
    }

    fn ids(&self) -> Vec<String> {
        self.0.read().ids()
    }
}
