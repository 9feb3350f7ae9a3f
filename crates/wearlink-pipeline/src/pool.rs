use std::collections::BTreeSet;

use crate::error::{Result, RouteError};

pub const MAX_PROCESSORS: u8 = 28;
pub const MAX_LOGGERS: u8 = 8;
pub const MAX_TIMERS: u8 = 8;
pub const MAX_EVENTS: u8 = 28;

/// Fixed-size arena of small integer ids with a lowest-first free list.
#[derive(Debug, Clone)]
pub struct IdPool {
    name: &'static str,
    capacity: u8,
    free: BTreeSet<u8>,
}

impl IdPool {
    pub fn new(name: &'static str, capacity: u8) -> Self {
        Self {
            name,
            capacity,
            free: (0..capacity).collect(),
        }
    }

    /// Lowest free id, or [`RouteError::ResourceExhausted`] when empty.
    pub fn allocate(&mut self) -> Result<u8> {
        let id = self
            .free
            .iter()
            .next()
            .copied()
            .ok_or(RouteError::ResourceExhausted { pool: self.name })?;
        self.free.remove(&id);
        Ok(id)
    }

    /// Return an id to the pool.
    ///
    /// Freeing an id that is not currently allocated is an
    /// internal-consistency fault and panics; callers own their ids.
    pub fn free(&mut self, id: u8) {
        assert!(id < self.capacity, "{} id {id} out of range", self.name);
        assert!(
            self.free.insert(id),
            "double free of {} id {id}",
            self.name
        );
    }

    /// Claim a specific id, for rebuilding state from a snapshot.
    pub fn reserve(&mut self, id: u8) -> Result<()> {
        if !self.free.remove(&id) {
            return Err(RouteError::ResourceExhausted { pool: self.name });
        }
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> u8 {
        self.capacity
    }
}

/// The four per-device id pools routes draw from.
#[derive(Debug, Clone)]
pub struct ResourcePools {
    pub processors: IdPool,
    pub loggers: IdPool,
    pub timers: IdPool,
    pub events: IdPool,
}

impl ResourcePools {
    pub fn new() -> Self {
        Self {
            processors: IdPool::new("processor", MAX_PROCESSORS),
            loggers: IdPool::new("logger", MAX_LOGGERS),
            timers: IdPool::new("timer", MAX_TIMERS),
            events: IdPool::new("event", MAX_EVENTS),
        }
    }
}

impl Default for ResourcePools {
    fn default() -> Self {
        Self::new()
    }
}
