//! Reusable scratch buffers
//!
//! Sampling writes per-feature differences into a scratch buffer before
//! reducing them. Buffers are checked out of a [`ScratchPool`] and go back
//! to it when dropped, so repeated explanations of the same width stop
//! allocating after warm-up.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Statistics for the scratch pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Checkouts served from a pooled buffer
    pub hits: u64,
    /// Checkouts that had to allocate
    pub misses: u64,
    /// Buffers currently parked in the pool
    pub pooled_buffers: usize,
    /// Hit rate
    pub hit_rate: f64,
}

/// A checked-out buffer that returns to its pool when dropped
pub struct ScratchBuffer {
    data: Vec<f64>,
    // Weak so the pool is not kept alive by outstanding buffers
    pool: Option<Weak<ScratchPool>>,
}

impl ScratchBuffer {
    /// A standalone buffer not tied to any pool
    pub fn detached(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
            pool: None,
        }
    }

    /// Take the contents, preventing return to the pool
    pub fn into_vec(mut self) -> Vec<f64> {
        self.pool = None;
        std::mem::take(&mut self.data)
    }
}

impl Deref for ScratchBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some(weak) = self.pool.take() {
            if let Some(pool) = weak.upgrade() {
                pool.give_back(std::mem::take(&mut self.data));
            }
        }
    }
}

/// Pool of `f64` buffers keyed by length
pub struct ScratchPool {
    max_buffers_per_len: usize,
    buffers: Mutex<HashMap<usize, Vec<Vec<f64>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ScratchPool {
    /// Create a pool keeping at most `max_buffers_per_len` idle buffers per length
    pub fn new(max_buffers_per_len: usize) -> Arc<Self> {
        Arc::new(Self {
            max_buffers_per_len,
            buffers: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Check out a zeroed buffer of exactly `len` elements
    pub fn checkout(self: &Arc<Self>, len: usize) -> ScratchBuffer {
        let reused = self.buffers.lock().get_mut(&len).and_then(|list| list.pop());
        let data = match reused {
            Some(mut data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                data.fill(0.0);
                data
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                vec![0.0; len]
            }
        };
        ScratchBuffer {
            data,
            pool: Some(Arc::downgrade(self)),
        }
    }

    fn give_back(&self, data: Vec<f64>) {
        let mut buffers = self.buffers.lock();
        let list = buffers.entry(data.len()).or_default();
        if list.len() < self.max_buffers_per_len {
            list.push(data);
        }
    }

    /// Drop every idle buffer
    pub fn clear(&self) {
        self.buffers.lock().clear();
    }

    /// Current statistics
    pub fn stats(&self) -> PoolStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let pooled_buffers = self.buffers.lock().values().map(Vec::len).sum();
        PoolStats {
            hits,
            misses,
            pooled_buffers,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }
}

impl std::fmt::Debug for ScratchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchPool")
            .field("max_buffers_per_len", &self.max_buffers_per_len)
            .field("stats", &self.stats())
            .finish()
    }
}
