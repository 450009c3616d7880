//! Round-robin rotation over configured values.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free round-robin cursor over a fixed list.
#[derive(Debug)]
pub struct Rotator<T> {
    items: Vec<T>,
    cursor: AtomicUsize,
}

impl<T: Clone> Rotator<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next value in rotation, or `None` when the list is empty.
    pub fn pick(&self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.items.len();
        self.items.get(i).cloned()
    }
}
