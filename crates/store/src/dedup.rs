//! Recency cache of completed audits.
//!
//! Entries live in a primary store keyed by insertion sequence, with two
//! secondary indexes (by identity and by subject) holding sequences in
//! insertion order. Eviction is FIFO on insertion: reading an entry never
//! extends its life. TTL only hides entries from identity history; entries
//! leave through capacity eviction or an explicit purge.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use audit_gate_core::{
    config::CacheConfig, CacheEntry, Clock, Error, IdentityId, Result, SubjectId,
};

/// Counters reported by [`DeduplicationCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<u64, CacheEntry>,
    by_identity: HashMap<IdentityId, VecDeque<u64>>,
    by_subject: HashMap<SubjectId, VecDeque<u64>>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    inserts: u64,
    evictions: u64,
}

impl Inner {
    fn entry(&self, seq: u64) -> Result<&CacheEntry> {
        self.entries
            .get(&seq)
            .ok_or_else(|| Error::inconsistency(format!("index points at missing entry {seq}")))
    }

    /// Resolve an index list newest-first.
    fn resolve<'a>(&'a self, seqs: Option<&'a VecDeque<u64>>) -> Result<Vec<&'a CacheEntry>> {
        seqs.into_iter()
            .flat_map(|s| s.iter().rev())
            .map(|seq| self.entry(*seq))
            .collect()
    }

    fn evict_oldest(&mut self) -> Result<Option<CacheEntry>> {
        let Some((seq, entry)) = self.entries.pop_first() else {
            return Ok(None);
        };
        unlink_front(&mut self.by_identity, &entry.identity, seq)?;
        unlink_front(&mut self.by_subject, &entry.subject, seq)?;
        self.evictions += 1;
        Ok(Some(entry))
    }
}

/// The globally oldest entry is also the oldest in each of its indexes.
fn unlink_front<K: Eq + Hash + std::fmt::Display>(
    index: &mut HashMap<K, VecDeque<u64>>,
    key: &K,
    seq: u64,
) -> Result<()> {
    let slots = index
        .get_mut(key)
        .ok_or_else(|| Error::inconsistency(format!("no index slot for {key}")))?;
    if slots.front() != Some(&seq) {
        return Err(Error::inconsistency(format!(
            "evicted entry {seq} is not the oldest indexed under {key}"
        )));
    }
    slots.pop_front();
    if slots.is_empty() {
        index.remove(key);
    }
    Ok(())
}

/// Bounded, time-aware cache of recently completed audits.
pub struct DeduplicationCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DeduplicationCache {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl,
            clock,
        }
    }

    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.capacity, config.ttl(), clock)
    }

    /// A poisoned lock fails the caller that observes it, then the poison
    /// is cleared so later calls see the recovered state.
    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|poisoned| {
            drop(poisoned.into_inner());
            self.inner.clear_poison();
            tracing::error!("Dedup cache lock was poisoned, recovered");
            Error::inconsistency("dedup cache lock poisoned")
        })
    }

    fn age(&self, entry: &CacheEntry, now: DateTime<Utc>) -> ChronoDuration {
        now.signed_duration_since(entry.inserted_at)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>, within: Duration) -> bool {
        ChronoDuration::from_std(within)
            .map(|window| self.age(entry, now) <= window)
            .unwrap_or(true)
    }

    /// Most recent entry for the exact (identity, subject) pair, if it was
    /// inserted no longer than `within` ago.
    pub fn lookup(
        &self,
        identity: &IdentityId,
        subject: &SubjectId,
        within: Duration,
    ) -> Result<Option<CacheEntry>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;

        let mut newest = None;
        if let Some(seqs) = inner.by_identity.get(identity) {
            for seq in seqs.iter().rev() {
                let entry = inner.entry(*seq)?;
                if &entry.subject == subject {
                    newest = Some(entry);
                    break;
                }
            }
        }

        let found = newest
            .filter(|entry| self.is_fresh(entry, now, within))
            .cloned();
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        tracing::debug!(
            identity = %identity,
            subject = %subject,
            hit = found.is_some(),
            "Dedup lookup"
        );
        Ok(found)
    }

    /// Insert an entry, evicting the oldest-inserted one at capacity.
    ///
    /// Returns the evicted entry, if any.
    pub fn insert(&self, entry: CacheEntry) -> Result<Option<CacheEntry>> {
        let mut inner = self.lock()?;

        let evicted = if inner.entries.len() >= self.capacity {
            inner.evict_oldest()?
        } else {
            None
        };

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .by_identity
            .entry(entry.identity.clone())
            .or_default()
            .push_back(seq);
        inner
            .by_subject
            .entry(entry.subject.clone())
            .or_default()
            .push_back(seq);
        tracing::debug!(
            audit_id = %entry.audit_id,
            identity = %entry.identity,
            subject = %entry.subject,
            size = inner.entries.len() + 1,
            "Cache entry inserted"
        );
        inner.entries.insert(seq, entry);
        inner.inserts += 1;

        if let Some(old) = &evicted {
            tracing::debug!(audit_id = %old.audit_id, "Cache entry evicted");
        }
        Ok(evicted)
    }

    /// Entries for `identity`, newest first. Entries older than the TTL are
    /// skipped unless `include_stale` is set.
    pub fn by_identity(&self, identity: &IdentityId, include_stale: bool) -> Result<Vec<CacheEntry>> {
        let now = self.clock.now();
        let inner = self.lock()?;
        Ok(inner
            .resolve(inner.by_identity.get(identity))?
            .into_iter()
            .filter(|entry| include_stale || self.is_fresh(entry, now, self.ttl))
            .cloned()
            .collect())
    }

    /// Every resident entry for `subject` across identities, newest first.
    pub fn by_subject(&self, subject: &SubjectId) -> Result<Vec<CacheEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .resolve(inner.by_subject.get(subject))?
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let inner = self.lock()?;
        Ok(CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            inserts: inner.inserts,
            evictions: inner.evictions,
        })
    }

    /// Remove every entry for which `keep` returns false, preserving the
    /// insertion order of the rest. Returns the number removed.
    pub fn retain(&self, mut keep: impl FnMut(&CacheEntry) -> bool) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| keep(entry));
        let removed = before - inner.entries.len();
        if removed > 0 {
            let Inner {
                entries,
                by_identity,
                by_subject,
                ..
            } = &mut *inner;
            for slots in by_identity.values_mut().chain(by_subject.values_mut()) {
                slots.retain(|seq| entries.contains_key(seq));
            }
            by_identity.retain(|_, slots| !slots.is_empty());
            by_subject.retain(|_, slots| !slots.is_empty());
            tracing::info!(removed, "Dedup cache entries purged");
        }
        Ok(removed)
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.entries.clear();
        inner.by_identity.clear();
        inner.by_subject.clear();
        tracing::info!("Dedup cache cleared");
        Ok(())
    }
}
