use crate::models::{ConversationTurn, DEFAULT_MEMORY_WINDOW};
use std::collections::VecDeque;

/// Sliding window over the most recent conversation turns.
///
/// Not synchronised; the session controller guards it with a mutex.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    capacity: usize,
    turns: VecDeque<ConversationTurn>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WINDOW)
    }
}

impl ConversationMemory {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Oldest first.
    pub fn as_messages(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
