//! Bounded in-memory mailbox for incoming messages.
//!
//! A FIFO of the most recent incoming records. Inserting into a full
//! buffer evicts the oldest entry. Reads are destructive: `drain`
//! removes what it returns, so the buffer behaves like an unread
//! mailbox, while records from non-matching rooms stay put in their
//! original order.

use std::collections::VecDeque;

use agentnet_protocol::IncomingMessage;

/// Maximum buffered records before the oldest is evicted.
pub const BUFFER_CAPACITY: usize = 1000;

pub struct MessageBuffer {
    entries: VecDeque<IncomingMessage>,
    capacity: usize,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest when at capacity.
    pub fn push(&mut self, msg: IncomingMessage) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(msg);
    }

    /// Remove and return all records matching `room` (case-insensitive),
    /// or every record when no filter is given. Non-matching records are
    /// preserved in order.
    pub fn drain(&mut self, room: Option<&str>) -> Vec<IncomingMessage> {
        let Some(filter) = room else {
            return self.entries.drain(..).collect();
        };

        let filter = filter.to_lowercase();
        let mut matched = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.entries.len());
        for msg in self.entries.drain(..) {
            if msg.room.to_lowercase() == filter {
                matched.push(msg);
            } else {
                remaining.push_back(msg);
            }
        }
        self.entries = remaining;
        matched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
