//! Bounded, TTL-expiring cache of frame results.
//!
//! Keys are `FrameFingerprint`s sampled from the frame payload rather than a
//! hash of the whole payload. Two frames with the same byte length and the same
//! first and last 100 characters share a fingerprint and therefore a cached
//! result. That false-positive risk is accepted: hashing a few hundred bytes is
//! constant time while full frames run to hundreds of kilobytes.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::result::FrameResult;

/// Characters sampled from each end of the payload.
pub const FINGERPRINT_SAMPLE_CHARS: usize = 100;

/// Bytes of the SHA-256 digest kept in a fingerprint (hex-encoded to 32 chars).
const FINGERPRINT_BYTES: usize = 16;

/// Sampled cache key for a frame. Not an identity for the frame itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameFingerprint(String);

impl FrameFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key from the first and last 100 characters plus the length.
pub fn generate_key(frame_data: &str) -> FrameFingerprint {
    let prefix_end = frame_data
        .char_indices()
        .nth(FINGERPRINT_SAMPLE_CHARS)
        .map(|(idx, _)| idx)
        .unwrap_or(frame_data.len());
    let suffix_start = frame_data
        .char_indices()
        .rev()
        .nth(FINGERPRINT_SAMPLE_CHARS - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(frame_data[..prefix_end].as_bytes());
    hasher.update(frame_data[suffix_start..].as_bytes());
    hasher.update(frame_data.len().to_string().as_bytes());
    let digest = hasher.finalize();
    FrameFingerprint(hex::encode(&digest[..FINGERPRINT_BYTES]))
}

#[derive(Clone, Debug)]
struct CacheEntry {
    value: FrameResult,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Thread-safe frame result cache.
///
/// Every public operation takes the map lock exactly once, so a capacity check
/// and the insert that follows it cannot interleave with another `put`.
///
/// The LRU order is kept equal to insertion order: lookups use `peek`, which
/// never promotes, and only `put` moves an entry to the front. Popping the
/// least recently used entry therefore evicts the oldest insert.
pub struct FrameCache {
    entries: Mutex<LruCache<FrameFingerprint, CacheEntry>>,
    max_size: usize,
    ttl: Duration,
}

impl FrameCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_size,
            ttl,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the cached result when present and not expired.
    pub fn get(&self, frame_data: &str) -> Option<FrameResult> {
        self.get_at(frame_data, Instant::now())
    }

    pub fn get_at(&self, frame_data: &str, now: Instant) -> Option<FrameResult> {
        let key = generate_key(frame_data);
        let mut entries = self.lock();
        let entry = entries.peek(&key)?;
        if entry.is_expired(now, self.ttl) {
            entries.pop(&key);
            log::debug!("cache entry {} expired", key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stores a copy of `result`, evicting the oldest entry first when full.
    pub fn put(&self, frame_data: &str, result: &FrameResult) {
        self.put_at(frame_data, result, Instant::now());
    }

    pub fn put_at(&self, frame_data: &str, result: &FrameResult, now: Instant) {
        if self.max_size == 0 {
            return;
        }
        let key = generate_key(frame_data);
        let mut entries = self.lock();
        if entries.len() >= self.max_size && !entries.contains(&key) {
            if let Some((oldest, _)) = entries.pop_lru() {
                log::debug!("cache full ({}); evicted {}", self.max_size, oldest);
            }
        }
        entries.put(
            key,
            CacheEntry {
                value: result.clone(),
                inserted_at: now,
            },
        );
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn clear_expired(&self) -> usize {
        self.clear_expired_at(Instant::now())
    }

    pub fn clear_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let expired: Vec<FrameFingerprint> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// True when the frame's fingerprint is stored, expired or not.
    pub fn contains(&self, frame_data: &str) -> bool {
        self.lock().contains(&generate_key(frame_data))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Every critical section leaves the map consistent, so a poisoned lock is
    // still safe to reuse.
    fn lock(&self) -> MutexGuard<'_, LruCache<FrameFingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
