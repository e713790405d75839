//! Spawn slot allocation.
//!
//! Each room has a fixed set of spawn locations numbered `0..capacity`.
//! Slots are handed out lowest-first so the same join order always lands
//! players in the same places, which keeps debugging sessions
//! reproducible.

use std::collections::BTreeMap;

use rand::Rng;

use crate::SpawnExhaustion;

/// A slot handed to a joining player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnSlot {
    pub index: usize,
    /// `true` if the slot was already held by someone else (pool
    /// exhausted, random reuse).
    pub shared: bool,
}

/// Bounded pool of spawn slot indices for one room.
///
/// Tracks a holder count per index. Under normal load every count is 1;
/// counts above 1 only appear after exhaustion with
/// [`SpawnExhaustion::ReuseRandom`].
#[derive(Debug, Clone)]
pub struct SpawnSlotPool {
    capacity: usize,
    policy: SpawnExhaustion,
    held: BTreeMap<usize, u32>,
}

impl SpawnSlotPool {
    pub fn new(capacity: usize, policy: SpawnExhaustion) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            held: BTreeMap::new(),
        }
    }

    /// Hands out the lowest free index.
    ///
    /// When every index is held, follows the exhaustion policy: a random
    /// held index (marked `shared`), or `None` under
    /// [`SpawnExhaustion::Reject`].
    pub fn allocate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<SpawnSlot> {
        if let Some(index) = (0..self.capacity).find(|i| !self.held.contains_key(i)) {
            self.held.insert(index, 1);
            return Some(SpawnSlot {
                index,
                shared: false,
            });
        }

        match self.policy {
            SpawnExhaustion::Reject => None,
            SpawnExhaustion::ReuseRandom => {
                let index = rng.random_range(0..self.capacity);
                *self.held.entry(index).or_insert(0) += 1;
                tracing::warn!(
                    index,
                    capacity = self.capacity,
                    "spawn pool exhausted, sharing a slot"
                );
                Some(SpawnSlot {
                    index,
                    shared: true,
                })
            }
        }
    }

    /// Gives a slot back. Releasing an index that is not held is a no-op
    /// and returns `false`.
    pub fn release(&mut self, index: usize) -> bool {
        match self.held.get_mut(&index) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.held.remove(&index);
                true
            }
            None => false,
        }
    }

    pub fn is_held(&self, index: usize) -> bool {
        self.held.contains_key(&index)
    }

    /// Indices currently held, ascending.
    pub fn in_use(&self) -> impl Iterator<Item = usize> + '_ {
        self.held.keys().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_exhausted(&self) -> bool {
        self.held.len() >= self.capacity
    }
}
