//! Bounded RGBW frame cache keyed by (scope, frame).
//!
//! - **LruCache**: O(1) get/put via the `lru` crate, unbounded by count so
//!   eviction is driven by both limits below
//! - **Limits**: max entry count and max total bytes; oldest entries go first
//! - **Idempotent put**: re-inserting a key replaces the buffer and fixes up
//!   the byte total
//!
//! Frames from `frame_data_all` are stored per slave under `Scope::Slave(id)`
//! so board and single-slave views share entries.

use std::sync::Arc;

use log::{debug, trace};
use lru::LruCache;

use super::session::Scope;

/// Immutable RGBW bytes, shared between cache and current view
pub type RgbwBuffer = Arc<[u8]>;

pub const DEFAULT_MAX_ENTRIES: usize = 2048;
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub scope: Scope,
    pub frame: u32,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    hits: u64,
    misses: u64,
}

impl CacheStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
pub struct FrameCache {
    entries: LruCache<FrameKey, RgbwBuffer>,
    max_entries: usize,
    max_bytes: usize,
    bytes: usize,
    stats: CacheStats,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES)
    }
}

impl FrameCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let max_entries = max_entries.max(1);
        debug!(
            "FrameCache created: max_entries={}, max_bytes={} MB",
            max_entries,
            max_bytes / 1024 / 1024
        );
        Self {
            entries: LruCache::unbounded(),
            max_entries,
            max_bytes,
            bytes: 0,
            stats: CacheStats::default(),
        }
    }

    /// Insert or replace, then evict least recently used past either limit.
    ///
    /// A single buffer larger than the byte budget is still kept: the newest
    /// frame always survives its own insert.
    pub fn put(&mut self, scope: Scope, frame: u32, buf: RgbwBuffer) {
        let key = FrameKey { scope, frame };
        let size = buf.len();
        if let Some(old) = self.entries.put(key, buf) {
            self.bytes -= old.len();
        }
        self.bytes += size;
        trace!("Cached {} frame {} ({} bytes)", scope, frame, size);

        while self.entries.len() > 1
            && (self.entries.len() > self.max_entries || self.bytes > self.max_bytes)
        {
            match self.entries.pop_lru() {
                Some((k, evicted)) => {
                    self.bytes -= evicted.len();
                    trace!("Evicted {} frame {}", k.scope, k.frame);
                }
                None => break,
            }
        }
    }

    pub fn get(&mut self, scope: Scope, frame: u32) -> Option<RgbwBuffer> {
        let hit = self.entries.get(&FrameKey { scope, frame }).cloned();
        if hit.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        hit
    }

    /// Presence check without touching recency or stats
    pub fn contains(&self, scope: Scope, frame: u32) -> bool {
        self.entries.contains(&FrameKey { scope, frame })
    }

    /// True when every listed slave has this frame cached
    pub fn contains_all(&self, slave_ids: &[i32], frame: u32) -> bool {
        !slave_ids.is_empty()
            && slave_ids
                .iter()
                .all(|id| self.contains(Scope::Slave(*id), frame))
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("FrameCache cleared ({} entries, {} bytes)", self.entries.len(), self.bytes);
        }
        self.entries.clear();
        self.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
