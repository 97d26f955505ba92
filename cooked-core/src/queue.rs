use crate::model::SiteGroup;

/// Leader-owned dispatch queue: an immutable list of work items plus an
/// assignment cursor.
///
/// Items are handed out in order, each at most once. There is no lease
/// tracking, so an item handed to a worker that never reports is lost for
/// the run.
#[derive(Debug, Clone)]
pub struct WorkQueue<T = SiteGroup> {
    items: Vec<T>,
    cursor: usize,
}

impl<T: Clone> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: Clone> WorkQueue<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    /// Hand out the next not-yet-dispatched item.
    pub fn take_next(&mut self) -> Option<T> {
        let item = self.items.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dispatched(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.items.len()
    }
}
