//! Join point after the worker pool: workers finish out of order, the
//! buffer releases results strictly by ticket.
//!
//! Tickets are dense (0, 1, 2, ...) because they are assigned after the
//! drop-oldest queue. A ticket whose result is lost is abandoned with
//! `skip_next`; if that result shows up late anyway, `insert` discards
//! it rather than re-releasing a position that already went out.

use std::collections::HashMap;

pub struct ReorderBuffer<T> {
    next_ticket: u64,
    pending: HashMap<u64, T>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next_ticket: 0,
            pending: HashMap::new(),
        }
    }

    /// Accepts a finished result and returns every result that is now
    /// releasable in ticket order (possibly empty, possibly several).
    /// A result for an already skipped ticket is dropped.
    pub fn insert(&mut self, ticket: u64, item: T) -> Vec<T> {
        if ticket < self.next_ticket {
            return Vec::new();
        }
        self.pending.insert(ticket, item);

        let mut released = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_ticket) {
            released.push(item);
            self.next_ticket += 1;
        }
        released
    }

    /// Tickets received but not yet releasable.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The ticket the buffer is waiting on.
    pub fn next_ticket(&self) -> u64 {
        self.next_ticket
    }

    /// Abandons the ticket currently waited on, releasing anything
    /// queued up behind it. Used when a result is known to be lost.
    pub fn skip_next(&mut self) -> Vec<T> {
        self.next_ticket += 1;
        let mut released = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_ticket) {
            released.push(item);
            self.next_ticket += 1;
        }
        released
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_inserts_release_immediately() {
        let mut buffer = ReorderBuffer::new();
        assert_eq!(buffer.insert(0, "a"), vec!["a"]);
        assert_eq!(buffer.insert(1, "b"), vec!["b"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_out_of_order_insert_held_back() {
        let mut buffer = ReorderBuffer::new();
        assert!(buffer.insert(2, "c").is_empty());
        assert!(buffer.insert(1, "b").is_empty());
        assert_eq!(buffer.pending_len(), 2);

        // Ticket 0 arrives last and releases the whole run
        assert_eq!(buffer.insert(0, "a"), vec!["a", "b", "c"]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_ticket(), 3);
    }

    #[test]
    fn test_partial_release() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(3, "d");
        assert_eq!(buffer.insert(0, "a"), vec!["a"]);
        assert_eq!(buffer.insert(1, "b"), vec!["b"]);
        // 2 still missing, 3 stays pending
        assert_eq!(buffer.pending_len(), 1);
        assert_eq!(buffer.insert(2, "c"), vec!["c", "d"]);
    }

    #[test]
    fn test_skip_next_unblocks_run() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(1, "b");
        buffer.insert(2, "c");
        // Ticket 0 is lost
        assert_eq!(buffer.skip_next(), vec!["b", "c"]);
        assert_eq!(buffer.next_ticket(), 3);
    }

    #[test]
    fn test_late_result_for_skipped_ticket_discarded() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(1, "b");
        // Ticket 0 is presumed lost and abandoned
        assert_eq!(buffer.skip_next(), vec!["b"]);
        // ...then its result arrives after all
        assert!(buffer.insert(0, "a").is_empty());
        assert!(buffer.is_empty());
        assert_eq!(buffer.next_ticket(), 2);
    }

    #[test]
    fn test_skip_next_with_nothing_pending() {
        let mut buffer: ReorderBuffer<&str> = ReorderBuffer::new();
        assert!(buffer.skip_next().is_empty());
        assert_eq!(buffer.next_ticket(), 1);
    }
}
