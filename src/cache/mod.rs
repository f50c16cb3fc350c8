//! Session-scoped statement caches
//!
//! Two independent strict-LRU caches:
//! * the query cache maps exact SQL text to parsed [`QueryMeta`]
//! * the prepare cache maps a [`Fingerprint`] to a server-side
//!   [`PreparedHandle`]
//!
//! A prepared handle leaving the prepare cache is a server resource that must
//! be deallocated; [`StatementCaches::insert_prepared`] hands it back to the
//! caller for that purpose.

mod bounded;

pub use bounded::BoundedCache;

use crate::metrics::{counters, labels};
use crate::row::Column;
use crate::statement::{Fingerprint, QueryMeta};
use std::sync::Arc;

/// Query cache: SQL text → parsed metadata
pub type QueryCache = BoundedCache<String, QueryMeta>;

/// Prepare cache: fingerprint → server handle
pub type PrepareCache = BoundedCache<Fingerprint, PreparedHandle>;

/// Reference to a statement prepared on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    /// Server-assigned statement id
    pub statement_id: u32,
    /// Parameter count reported by the server
    pub params: u16,
    /// Result columns reported at prepare time
    pub columns: Arc<[Column]>,
}

/// Counters exposed by [`StatementCaches::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Query cache hits
    pub query_hits: u64,
    /// Query cache misses
    pub query_misses: u64,
    /// Query cache resident entries
    pub query_resident: usize,
    /// Prepare cache hits
    pub prepare_hits: u64,
    /// Prepare cache misses (each one a prepare round-trip)
    pub prepare_misses: u64,
    /// Prepare cache resident entries
    pub prepare_resident: usize,
    /// Prepared handles evicted
    pub prepare_evictions: u64,
    /// COM_STMT_CLOSE packets written
    pub deallocations: u64,
    /// Deallocations that could not be written
    pub deallocation_failures: u64,
}

/// The two caches of one session
#[derive(Debug)]
pub struct StatementCaches {
    query: QueryCache,
    prepare: PrepareCache,
    deallocations: u64,
    deallocation_failures: u64,
}

impl StatementCaches {
    /// Create empty caches
    pub fn new(query_capacity: usize, prepare_capacity: usize) -> Self {
        Self {
            query: QueryCache::new(query_capacity),
            prepare: PrepareCache::new(prepare_capacity),
            deallocations: 0,
            deallocation_failures: 0,
        }
    }

    /// Parsed metadata for `sql`, parsing and caching it on a miss
    pub fn query_meta(&mut self, sql: &str) -> QueryMeta {
        if let Some(meta) = self.query.get(sql) {
            counters::cache_hit(labels::CACHE_QUERY);
            return *meta;
        }
        counters::cache_miss(labels::CACHE_QUERY);
        let meta = QueryMeta::parse(sql);
        if self.query.insert(sql.to_string(), meta).is_some() && self.query.is_enabled() {
            counters::cache_eviction(labels::CACHE_QUERY);
        }
        meta
    }

    /// Resident prepared handle for `fingerprint`
    pub fn prepared(&mut self, fingerprint: &Fingerprint) -> Option<PreparedHandle> {
        match self.prepare.get(fingerprint) {
            Some(handle) => {
                counters::cache_hit(labels::CACHE_PREPARE);
                tracing::trace!(statement_id = handle.statement_id, "prepare cache hit");
                Some(handle.clone())
            }
            None => {
                counters::cache_miss(labels::CACHE_PREPARE);
                None
            }
        }
    }

    /// Store a freshly prepared handle
    ///
    /// Returns the handle that is no longer resident and must be deallocated
    /// on the server: the evicted one, or `handle` itself when the prepare
    /// cache is disabled.
    pub fn insert_prepared(
        &mut self,
        fingerprint: Fingerprint,
        handle: PreparedHandle,
    ) -> Option<PreparedHandle> {
        let displaced = self.prepare.insert(fingerprint, handle)?;
        if self.prepare.is_enabled() {
            counters::cache_eviction(labels::CACHE_PREPARE);
            tracing::debug!(
                statement_id = displaced.1.statement_id,
                fingerprint = %displaced.0,
                "prepared statement evicted"
            );
        }
        Some(displaced.1)
    }

    /// Remove every resident prepared handle
    pub fn drain_prepared(&mut self) -> Vec<PreparedHandle> {
        self.prepare.drain().into_iter().map(|(_, h)| h).collect()
    }

    /// Record the outcome of one deallocation
    pub fn record_deallocation(&mut self, written: bool) {
        if written {
            self.deallocations += 1;
        } else {
            self.deallocation_failures += 1;
            counters::deallocation_failed();
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            query_hits: self.query.hits(),
            query_misses: self.query.misses(),
            query_resident: self.query.len(),
            prepare_hits: self.prepare.hits(),
            prepare_misses: self.prepare.misses(),
            prepare_resident: self.prepare.len(),
            prepare_evictions: self.prepare.evictions(),
            deallocations: self.deallocations,
            deallocation_failures: self.deallocation_failures,
        }
    }
}
