use std::collections::VecDeque;

use rand::{Rng, seq::IteratorRandom};

use crate::experience::Experience;

/// Bounded FIFO store of transitions. Pushing into a full buffer evicts the
/// oldest transition.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, experience: Experience) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Draws `batch_size` distinct transitions uniformly at random. Returns
    /// fewer when the buffer holds fewer.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> Vec<&Experience> {
        self.buffer.iter().choose_multiple(rng, batch_size)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }
}
