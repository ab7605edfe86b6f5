//! Outbound message queue.
//!
//! Insertion order is delivery order. A batch taken for sending can be put
//! back at the front if the write fails, so nothing is lost or reordered.

use std::collections::VecDeque;

use crate::config::BatchingPolicy;

#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<String>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: String) {
        self.messages.push_back(payload);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Take the next batch according to `policy`. Empty when the queue is empty.
    pub fn take_batch(&mut self, policy: BatchingPolicy) -> Vec<String> {
        match policy {
            BatchingPolicy::Coalesce => self.messages.drain(..).collect(),
            BatchingPolicy::PerMessage => self.messages.pop_front().into_iter().collect(),
        }
    }

    /// Return an undelivered batch to the head of the queue, preserving order.
    pub fn restore(&mut self, batch: Vec<String>) {
        for payload in batch.into_iter().rev() {
            self.messages.push_front(payload);
        }
    }

    /// Snapshot of the queued payloads, oldest first.
    pub fn pending(&self) -> Vec<String> {
        self.messages.iter().cloned().collect()
    }
}
