//! Bounded set of source record identifiers.

use std::collections::{HashSet, VecDeque};

/// Insertion-ordered identifier set with a hard ceiling.
///
/// When [`trim`](Self::trim) finds more than `ceiling` entries it keeps the
/// most recently inserted half.
#[derive(Debug, Clone)]
pub struct SeenIds {
    ceiling: usize,
    order: VecDeque<Vec<u8>>,
    members: HashSet<Vec<u8>>,
}

impl SeenIds {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    pub fn contains(&self, id: &[u8]) -> bool {
        self.members.contains(id)
    }

    /// Returns false if the id was already present
    pub fn insert(&mut self, id: &[u8]) -> bool {
        if !self.members.insert(id.to_vec()) {
            return false;
        }
        self.order.push_back(id.to_vec());
        true
    }

    /// Enforce the ceiling
    pub fn trim(&mut self) {
        if self.order.len() <= self.ceiling {
            return;
        }

        let keep = self.ceiling / 2;
        while self.order.len() > keep {
            if let Some(old) = self.order.pop_front() {
                self.members.remove(&old);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
