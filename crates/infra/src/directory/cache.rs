//! Directory record caching with moka.
//!
//! Entries are never evicted by age; moka only bounds capacity. Freshness is
//! judged against the injected [`Clock`] so an expired entry stays available
//! as a stale fallback when the directory is unreachable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;

use gatepass_core::{Clock, ServiceNo, SystemClock};

use super::record::DirectoryRecord;

#[derive(Debug, Clone)]
struct Entry {
    record: Arc<DirectoryRecord>,
    fetched_at: DateTime<Utc>,
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Within the freshness window.
    Fresh(DirectoryRecord),
    /// Older than the window; only good as a fallback.
    Stale(DirectoryRecord),
    Miss,
}

/// Shared, concurrently readable cache of directory records.
///
/// Writers race last-writer-wins.
pub struct DirectoryCache<C: Clock = SystemClock> {
    entries: Cache<ServiceNo, Entry>,
    ttl: chrono::Duration,
    clock: C,
}

impl DirectoryCache<SystemClock> {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self::with_clock(ttl, max_capacity, SystemClock)
    }
}

impl<C: Clock> DirectoryCache<C> {
    pub fn with_clock(ttl: Duration, max_capacity: u64, clock: C) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn lookup(&self, key: &ServiceNo) -> CacheLookup {
        match self.entries.get(key) {
            Some(entry) => {
                let record = (*entry.record).clone();
                let fresh = entry
                    .fetched_at
                    .checked_add_signed(self.ttl)
                    .is_none_or(|expires| self.clock.now() < expires);
                if fresh {
                    tracing::debug!(service_no = %key, "directory cache hit");
                    CacheLookup::Fresh(record)
                } else {
                    tracing::debug!(service_no = %key, "directory cache entry is stale");
                    CacheLookup::Stale(record)
                }
            }
            None => {
                tracing::debug!(service_no = %key, "directory cache miss");
                CacheLookup::Miss
            }
        }
    }

    /// Any cached value for `key`, fresh or not.
    pub fn get_any(&self, key: &ServiceNo) -> Option<DirectoryRecord> {
        match self.lookup(key) {
            CacheLookup::Fresh(r) | CacheLookup::Stale(r) => Some(r),
            CacheLookup::Miss => None,
        }
    }

    pub fn insert(&self, key: ServiceNo, record: DirectoryRecord) {
        self.entries.insert(
            key,
            Entry {
                record: Arc::new(record),
                fetched_at: self.clock.now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use gatepass_core::ManualClock;

    use super::*;

    fn sn(s: &str) -> ServiceNo {
        ServiceNo::parse(s).unwrap()
    }

    fn record(name: &str) -> DirectoryRecord {
        DirectoryRecord {
            first_name: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn entry_goes_stale_but_is_kept() {
        let clock = ManualClock::default();
        let cache = DirectoryCache::with_clock(Duration::from_secs(1800), 100, clock.clone());
        cache.insert(sn("123456"), record("Jane"));

        assert_eq!(cache.lookup(&sn("123456")), CacheLookup::Fresh(record("Jane")));

        clock.advance(chrono::Duration::minutes(30));
        assert_eq!(cache.lookup(&sn("123456")), CacheLookup::Stale(record("Jane")));
        assert_eq!(cache.get_any(&sn("123456")), Some(record("Jane")));
    }

    #[test]
    fn unknown_key_misses() {
        let cache = DirectoryCache::new(Duration::from_secs(60), 10);
        assert_eq!(cache.lookup(&sn("000000")), CacheLookup::Miss);
        assert_eq!(cache.get_any(&sn("000000")), None);
    }

    #[test]
    fn last_writer_wins() {
        let cache = DirectoryCache::new(Duration::from_secs(60), 10);
        cache.insert(sn("1"), record("first"));
        cache.insert(sn("1"), record("second"));
        assert_eq!(cache.get_any(&sn("1")), Some(record("second")));
    }
}
