//! An unbounded, thread-safe FIFO queue.
//!
//! Producers never block on [`Queue::append`], consumers poll with
//! [`Queue::next`] and decide for themselves how to wait when it is empty.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("len", &self.len()).finish()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Adds an item to the back of the queue.
    pub fn append(&self, item: T) {
        self.items.lock().expect("poisoned").push_back(item);
    }

    /// Removes the item at the front of the queue, if any.
    pub fn next(&self) -> Option<T> {
        self.items.lock().expect("poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes items from the front for as long as `predicate` holds.
    pub fn drain_while<F>(&self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut items = self.items.lock().expect("poisoned");
        let mut drained = Vec::new();
        while items.front().is_some_and(&mut predicate) {
            if let Some(item) = items.pop_front() {
                drained.push(item);
            }
        }
        drained
    }

    /// Removes every item in the queue.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().expect("poisoned").drain(..).collect()
    }
}
