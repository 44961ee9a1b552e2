//! Recent message id window.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_WINDOW: usize = 100;

/// Bounded ring of recently seen message ids.
///
/// Retransmits and echoes arrive with an id that was already dispatched;
/// those must not trigger a command twice.
#[derive(Debug)]
pub struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentIds {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record `id`. Returns true if it was already in the window.
    pub fn observe(&mut self, id: &str) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.seen.contains(id) {
            return true;
        }

        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        false
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

impl Default for RecentIds {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
