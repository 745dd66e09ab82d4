//! The two pipeline mailboxes.
//!
//! Each queue guards its own `VecDeque` with its own lock. Nothing in the
//! crate holds both locks at once.

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::types::{AudioItem, SynthesisRequest};

/// Unbounded FIFO of text awaiting synthesis
#[derive(Default)]
pub struct TextQueue {
    items: Mutex<VecDeque<SynthesisRequest>>,
}

impl TextQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: SynthesisRequest) {
        self.items.lock().push_back(request);
    }

    pub fn pop(&self) -> Option<SynthesisRequest> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Capacity-bounded FIFO of fetched clips awaiting playback
pub struct AudioQueue {
    items: Mutex<VecDeque<AudioItem>>,
    capacity: usize,
}

impl AudioQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends unless the queue is already at capacity, handing the item back.
    pub fn push(&self, item: AudioItem) -> Result<(), AudioItem> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }

    pub fn pop(&self) -> Option<AudioItem> {
        self.items.lock().pop_front()
    }

    pub fn is_full(&self) -> bool {
        self.items.lock().len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
