//! Bounded handoff between the decode thread and the workers.
//!
//! With the default policy, a frame arriving while the queue is full
//! discards the OLDEST queued frame so the pipeline stays close to
//! live. Drops are counted and observable. The alternative `Block`
//! policy stalls the producer instead, trading latency for
//! completeness.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::shared::frame::Frame;

/// What happens when a frame arrives and the queue is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    Block,
}

struct QueueState {
    items: VecDeque<Frame>,
    closed: bool,
    dropped: u64,
}

pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    space: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::DropOldest)
    }

    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Enqueues a frame. Under `DropOldest` a full queue evicts its
    /// oldest frame; under `Block` the call waits for space. Returns
    /// the number of frames dropped by this call (0 or 1). Ignored
    /// after `close`.
    pub fn push(&self, frame: Frame) -> u64 {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return 0;
        }
        let mut dropped = 0;
        if state.items.len() == self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    state.items.pop_front();
                    state.dropped += 1;
                    dropped = 1;
                }
                OverflowPolicy::Block => {
                    while state.items.len() == self.capacity && !state.closed {
                        state = self.space.wait(state).unwrap();
                    }
                    if state.closed {
                        return 0;
                    }
                }
            }
        }
        state.items.push_back(frame);
        drop(state);
        self.available.notify_one();
        dropped
    }

    /// Blocks until a frame is available or the queue is closed and
    /// empty. `None` means no more frames will ever arrive.
    pub fn pop(&self) -> Option<Frame> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(frame) = state.items.pop_front() {
                drop(state);
                self.space.notify_one();
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Marks the queue closed. Queued frames remain poppable; blocked
    /// consumers wake up once the queue drains.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.available.notify_all();
        self.space.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.state.lock().unwrap().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, 3, seq, 0)
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(4);
        queue.push(make_frame(0));
        queue.push(make_frame(1));
        queue.push(make_frame(2));

        assert_eq!(queue.pop().unwrap().seq(), 0);
        assert_eq!(queue.pop().unwrap().seq(), 1);
        assert_eq!(queue.pop().unwrap().seq(), 2);
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = FrameQueue::new(2);
        assert_eq!(queue.push(make_frame(0)), 0);
        assert_eq!(queue.push(make_frame(1)), 0);
        assert_eq!(queue.push(make_frame(2)), 1);

        // Oldest (seq 0) was evicted
        assert_eq!(queue.pop().unwrap().seq(), 1);
        assert_eq!(queue.pop().unwrap().seq(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_burst_of_capacity_plus_k_drops_k() {
        let capacity = 4;
        let k = 3;
        let queue = FrameQueue::new(capacity);
        for seq in 0..(capacity + k) as u64 {
            queue.push(make_frame(seq));
        }
        assert_eq!(queue.dropped(), k as u64);
        assert_eq!(queue.len(), capacity);
        // Survivors are the newest `capacity` frames, still in order
        assert_eq!(queue.pop().unwrap().seq(), k as u64);
    }

    #[test]
    fn test_pop_after_close_drains_then_none() {
        let queue = FrameQueue::new(4);
        queue.push(make_frame(0));
        queue.close();

        assert_eq!(queue.pop().unwrap().seq(), 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_after_close_ignored() {
        let queue = FrameQueue::new(4);
        queue.close();
        queue.push(make_frame(0));
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_blocked_pop_wakes_on_close() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_block_policy_stalls_producer_until_space() {
        let queue = Arc::new(FrameQueue::with_policy(1, OverflowPolicy::Block));
        queue.push(make_frame(0));
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.push(make_frame(1)))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        // Producer is still parked; nothing was dropped
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().seq(), 0);
        assert_eq!(producer.join().unwrap(), 0);
        assert_eq!(queue.pop().unwrap().seq(), 1);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_block_policy_push_wakes_on_close() {
        let queue = Arc::new(FrameQueue::with_policy(1, OverflowPolicy::Block));
        queue.push(make_frame(0));
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.push(make_frame(1)))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.close();
        assert_eq!(producer.join().unwrap(), 0);
        // The blocked frame was discarded, not enqueued
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_blocked_pop_wakes_on_push() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.pop())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.push(make_frame(9));
        assert_eq!(consumer.join().unwrap().unwrap().seq(), 9);
    }
}
