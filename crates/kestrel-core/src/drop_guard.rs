use std::collections::VecDeque;
use std::sync::Arc;

use crate::cons::Cons;
use crate::object::Value;

/// Guard for iterative destruction of long cons chains.
///
/// Dropping a cell that owns the next cell would otherwise recurse once per
/// link. The guard instead takes ownership of each cell whose last holder is
/// going away, empties its slots into a work queue and lets the emptied cell
/// drop trivially.
pub(crate) struct DropGuard {
    queue: VecDeque<Arc<Cons>>,
}

impl DropGuard {
    /// Create a new drop guard
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Queue a cell for release
    pub(crate) fn push_cell(&mut self, cell: Option<Arc<Cons>>) {
        if let Some(cell) = cell {
            self.queue.push_back(cell);
        }
    }

    /// Queue a value; only cons cells need the queue, anything else drops here
    pub(crate) fn push_value(&mut self, value: Value) {
        let Some(object) = value else { return };
        if let Some(cell) = object.downcast::<Cons>() {
            drop(object);
            self.queue.push_back(cell);
        }
    }

    /// Run the destruction process until the queue is empty
    pub(crate) fn run(mut self) {
        while let Some(cell) = self.queue.pop_front() {
            // Still shared: the remaining holders keep the rest of the chain
            let Some(mut cell) = Arc::into_inner(cell) else {
                continue;
            };
            let (car, cdr) = cell.take_slots();
            self.push_value(car);
            self.push_cell(cdr);
        }
    }
}

impl Default for DropGuard {
    fn default() -> Self {
        Self::new()
    }
}
