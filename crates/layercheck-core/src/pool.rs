//! Free-list object pool
//!
//! Pooled objects are handed out by [`Pool::acquire`] and identified by a
//! generational [`PoolKey`]. When the free list runs dry the pool grows by a
//! batch that doubles every time, starting from the initial batch size.
//!
//! Released objects are reset before they go back on the free list. A key
//! stops resolving the moment its object is released, so a stale key can
//! never observe the next owner's data.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{trace, warn};

/// Restores a pooled object to its neutral state
pub trait Reset {
    fn reset(&mut self);
}

/// Handle to an object checked out of a [`Pool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    index: u32,
    generation: u32,
}

impl PoolKey {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    in_use: bool,
}

/// Doubling free-list pool
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: VecDeque<u32>,
    next_batch: usize,
}

impl<T: Default + Reset> Pool<T> {
    /// Create an empty pool; the first acquire allocates `initial_batch` objects
    pub fn new(initial_batch: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            next_batch: initial_batch.max(1),
        }
    }

    /// Create a pool and allocate its first batch up front
    pub fn with_preallocated(initial_batch: usize) -> Self {
        let mut pool = Self::new(initial_batch);
        pool.grow();
        pool
    }

    fn grow(&mut self) {
        let start = self.slots.len();
        let batch = self.next_batch;
        self.slots.reserve(batch);
        for index in start..start + batch {
            self.slots.push(Slot {
                value: T::default(),
                generation: 0,
                in_use: false,
            });
            self.free.push_back(index as u32);
        }
        self.next_batch = batch.saturating_mul(2);
        trace!("Pool grew by {} to {} objects", batch, self.slots.len());
    }

    /// Check out a neutral object
    pub fn acquire(&mut self) -> PoolKey {
        if self.free.is_empty() {
            self.grow();
        }
        // grow() always leaves at least one free slot
        let index = self.free.pop_front().unwrap_or_default();
        let slot = &mut self.slots[index as usize];
        slot.in_use = true;
        PoolKey {
            index,
            generation: slot.generation,
        }
    }

    /// Return an object to the pool, resetting it first
    ///
    /// Returns `false` if the key was stale or already released; the pool is
    /// left untouched in that case.
    pub fn release(&mut self, key: PoolKey) -> bool {
        match self.slots.get_mut(key.index()) {
            Some(slot) if slot.in_use && slot.generation == key.generation => {
                slot.value.reset();
                slot.in_use = false;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push_back(key.index);
                true
            }
            _ => {
                warn!("Ignoring release of stale pool key {}", key);
                false
            }
        }
    }

    pub fn get(&self, key: PoolKey) -> Option<&T> {
        self.slots
            .get(key.index())
            .filter(|slot| slot.in_use && slot.generation == key.generation)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, key: PoolKey) -> Option<&mut T> {
        self.slots
            .get_mut(key.index())
            .filter(|slot| slot.in_use && slot.generation == key.generation)
            .map(|slot| &mut slot.value)
    }

    pub fn contains(&self, key: PoolKey) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over every checked-out object
    pub fn iter(&self) -> impl Iterator<Item = (PoolKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.in_use.then_some((
                PoolKey {
                    index: index as u32,
                    generation: slot.generation,
                },
                &slot.value,
            ))
        })
    }

    /// Total number of objects ever allocated
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of objects on the free list
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of objects currently checked out
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
