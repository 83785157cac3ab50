//! Two-tier monologue memory for a single task.
//!
//! Long memory keeps every extracted monologue; short memory keeps the most
//! recent few with FIFO eviction. Both tiers feed prompt refinement through
//! random sampling with an injected RNG.

use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::VecDeque;

pub const DEFAULT_SHORT_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct MemoryStore {
    long: Vec<String>,
    short: VecDeque<String>,
    short_capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SHORT_CAPACITY)
    }

    /// A store whose short tier holds at most `short_capacity` entries (min 1).
    pub fn with_capacity(short_capacity: usize) -> Self {
        let short_capacity = short_capacity.max(1);
        Self {
            long: Vec::new(),
            short: VecDeque::with_capacity(short_capacity),
            short_capacity,
        }
    }

    /// Add an entry to both tiers, evicting the oldest short entry when full.
    pub fn append(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        self.long.push(entry.clone());
        if self.short.len() == self.short_capacity {
            self.short.pop_front();
        }
        self.short.push_back(entry);
    }

    pub fn long(&self) -> &[String] {
        &self.long
    }

    pub fn short(&self) -> Vec<&str> {
        self.short.iter().map(String::as_str).collect()
    }

    /// Number of long-tier entries (every append ever made).
    pub fn len(&self) -> usize {
        self.long.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty()
    }

    pub fn sample_long<R: Rng>(&self, rng: &mut R) -> Vec<String> {
        sample(&self.long, rng)
    }

    pub fn sample_short<R: Rng>(&self, rng: &mut R) -> Vec<String> {
        let short: Vec<String> = self.short.iter().cloned().collect();
        sample(&short, rng)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Random subset of size uniform in `1..=len`; empty when the tier is empty.
fn sample<R: Rng>(entries: &[String], rng: &mut R) -> Vec<String> {
    if entries.is_empty() {
        return Vec::new();
    }
    let size = rng.random_range(1..=entries.len());
    entries.choose_multiple(rng, size).cloned().collect()
}
