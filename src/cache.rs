//! Shared cache of parsed templates
//!
//! Documents are keyed by the SHA-256 digest of their source together with
//! the nesting limit they were parsed under, and stored as `Arc<Document>`,
//! so readers only ever see fully parsed trees. Parsing
//! happens outside the lock; concurrent misses on the same source may parse
//! twice but only the first insert is kept.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::error::ParseError;
use crate::parser::{parse_with_nesting, Document};

type CacheKey = [u8; 32];

fn key_for(source: &str, max_nesting: usize) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update((max_nesting as u64).to_le_bytes());
    hasher.update(source.as_bytes());
    hasher.finalize().into()
}

/// Hit/miss counters and occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct TemplateCache {
    entries: RwLock<HashMap<CacheKey, Arc<Document>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateCache {
    /// Create a cache holding at most `capacity` documents
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the parsed document for `source`, parsing and caching it on a miss.
    ///
    /// Parse failures are returned and never cached. Once the cache is full
    /// new documents are still parsed but not stored.
    pub fn get_or_parse(
        &self,
        source: &str,
        max_nesting: usize,
    ) -> Result<Arc<Document>, ParseError> {
        let key = key_for(source, max_nesting);

        // Fast path: check read lock first
        if let Some(doc) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(bytes = source.len(), "template cache hit");
            return Ok(Arc::clone(doc));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let parsed = Arc::new(parse_with_nesting(source, max_nesting)?);

        let mut entries = self.entries.write();
        // Double-check in case another thread parsed while we were parsing
        if let Some(existing) = entries.get(&key) {
            return Ok(Arc::clone(existing));
        }
        if entries.len() < self.capacity {
            entries.insert(key, Arc::clone(&parsed));
        }
        Ok(parsed)
    }

    /// Whether a document for `source` parsed under `max_nesting` is currently cached
    pub fn contains(&self, source: &str, max_nesting: usize) -> bool {
        self.entries.read().contains_key(&key_for(source, max_nesting))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
