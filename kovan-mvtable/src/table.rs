//! Two-choice multi-version hash table.
//!
//! Every bucket is a [`VersionedChain`] of [`Entry`] values, pre-filled with
//! the empty sentinel at version 0. Each key has two candidate buckets:
//!
//! - `hash1(key) = key % size`
//! - `hash2(key) = (key / 11) % size`
//!
//! Writes are serialized by one writer lock and tagged with a fresh
//! transaction id. A write that displaces residents carries the evicted entry
//! forward to its own candidates; when `max_reach` displacements are used up,
//! every node tagged with the transaction id is deleted again. Reads take no
//! lock and see the newest version at or below `last_committed`.

use crate::chain::VersionedChain;
use crate::config::TableConfig;
use crate::entry::Entry;
use crate::error::MvccError;
use core::sync::atomic::Ordering;
use crossbeam_utils::CachePadded;
use kovan::{Guard, pin};
use parking_lot::Mutex;
use portable_atomic::AtomicU64;
use tracing::{debug, trace, warn};

/// Divisor of the secondary hash.
const HASH2_DIVISOR: u64 = 11;

/// Multi-version hash table with two-choice placement.
pub struct MvccTable<V: 'static = u64> {
    buckets: Box<[VersionedChain<Entry<V>>]>,
    max_reach: usize,
    /// Source of every version number; strictly increasing.
    txn_counter: CachePadded<AtomicU64>,
    /// Read snapshot boundary. Only advanced once all nodes of a write are linked.
    last_committed: CachePadded<AtomicU64>,
    /// Serializes `put` and `delete`, including displacement and rollback.
    write_lock: Mutex<()>,
}

impl<V> MvccTable<V>
where
    V: Copy + Eq + Default + Send + Sync + 'static,
{
    /// Creates a table with `size` buckets and at most `max_reach`
    /// displacements per write.
    pub fn new(size: usize, max_reach: usize) -> Result<Self, MvccError> {
        Self::with_config(TableConfig::new(size, max_reach))
    }

    pub fn with_config(config: TableConfig) -> Result<Self, MvccError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TableConfig) -> Self {
        let buckets: Box<[VersionedChain<Entry<V>>]> =
            (0..config.size).map(|_| VersionedChain::new()).collect();

        // Version 0 sentinel: reads never meet an empty chain.
        let guard = pin();
        for chain in buckets.iter() {
            chain.insert(0, Entry::empty(), &guard);
        }
        drop(guard);

        debug!(
            size = config.size,
            max_reach = config.max_reach,
            "mvcc table created"
        );

        Self {
            buckets,
            max_reach: config.max_reach,
            txn_counter: CachePadded::new(AtomicU64::new(0)),
            last_committed: CachePadded::new(AtomicU64::new(0)),
            write_lock: Mutex::new(()),
        }
    }

    #[inline(always)]
    fn hash1(&self, key: u64) -> usize {
        (key % self.buckets.len() as u64) as usize
    }

    #[inline(always)]
    fn hash2(&self, key: u64) -> usize {
        ((key / HASH2_DIVISOR) % self.buckets.len() as u64) as usize
    }

    #[inline(always)]
    fn candidates(&self, key: u64) -> [usize; 2] {
        [self.hash1(key), self.hash2(key)]
    }

    #[inline(always)]
    fn bucket(&self, idx: usize) -> &VersionedChain<Entry<V>> {
        &self.buckets[idx]
    }

    /// Most recently linked entry of a bucket.
    #[inline]
    fn head_at(&self, idx: usize, guard: &Guard) -> Entry<V> {
        self.bucket(idx)
            .head(guard)
            .copied()
            .unwrap_or_else(Entry::empty)
    }

    #[inline]
    fn next_txn(&self) -> u64 {
        self.txn_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[inline]
    fn commit(&self, txn: u64) {
        self.last_committed.store(txn, Ordering::Release);
    }

    /// Stores `value` under `key`.
    ///
    /// A live entry for `key` in either candidate bucket gets the new value
    /// layered on top as a newer version. Otherwise the entry goes to the
    /// first candidate whose newest value is the empty sentinel, displacing
    /// the resident of the second candidate when neither is free.
    ///
    /// Returns [`MvccError::TableFull`] after `max_reach` displacements; no
    /// node of the failed transaction remains linked in that case.
    pub fn put(&self, key: u64, value: V) -> Result<(), MvccError> {
        if key == 0 {
            return Err(MvccError::ReservedKey);
        }

        let _writer = self.write_lock.lock();
        let txn = self.next_txn();
        let entry = Entry::new(key, value);
        let guard = pin();

        for idx in self.candidates(key) {
            if self.head_at(idx, &guard).holds(key) {
                self.bucket(idx).insert(txn, entry, &guard);
                self.commit(txn);
                debug!(key, txn, bucket = idx, "new version layered");
                return Ok(());
            }
        }

        let mut current = entry;
        let mut touched = Vec::with_capacity(self.max_reach);

        for attempt in 0..self.max_reach {
            let idx1 = self.hash1(current.key);
            if self.head_at(idx1, &guard).is_empty() {
                self.bucket(idx1).insert(txn, current, &guard);
                self.commit(txn);
                debug!(key, txn, bucket = idx1, displacements = attempt, "put committed");
                return Ok(());
            }

            let idx2 = self.hash2(current.key);
            let resident = self.head_at(idx2, &guard);
            if resident.is_empty() {
                self.bucket(idx2).insert(txn, current, &guard);
                self.commit(txn);
                debug!(key, txn, bucket = idx2, displacements = attempt, "put committed");
                return Ok(());
            }

            // Shadow the resident and carry it forward.
            self.bucket(idx2).insert(txn, current, &guard);
            touched.push(idx2);
            trace!(
                txn,
                attempt,
                bucket = idx2,
                placed = current.key,
                evicted = resident.key,
                "resident displaced"
            );
            current = resident;
        }
        drop(guard);

        for &idx in touched.iter() {
            self.bucket(idx).delete(txn);
        }
        warn!(
            key,
            txn,
            attempts = self.max_reach,
            rolled_back = touched.len(),
            "put abandoned, table too tight"
        );

        Err(MvccError::TableFull {
            key,
            attempts: self.max_reach,
        })
    }

    /// Reads the value of `key` as of the last committed transaction.
    ///
    /// Takes no lock. A write committing concurrently may or may not be seen.
    pub fn get(&self, key: u64) -> Option<V> {
        self.read_at(key, self.last_committed())
    }

    /// Reads the value of `key` as of transaction `version`.
    ///
    /// Versions above the last committed one are clamped to it.
    pub fn get_at(&self, key: u64, version: u64) -> Option<V> {
        self.read_at(key, version.min(self.last_committed()))
    }

    fn read_at(&self, key: u64, version: u64) -> Option<V> {
        let guard = pin();
        for idx in self.candidates(key) {
            if let Some(entry) = self.bucket(idx).latest_version(version, &guard) {
                if entry.holds(key) {
                    return Some(entry.value);
                }
            }
        }
        None
    }

    /// Removes `key` by writing the empty sentinel on top of its live version.
    ///
    /// History is not mutated, so snapshots taken earlier still see the old
    /// value. Returns whether a live entry was found.
    pub fn delete(&self, key: u64) -> Result<bool, MvccError> {
        if key == 0 {
            return Ok(false);
        }

        let _writer = self.write_lock.lock();
        let txn = self.next_txn();
        let visible = self.last_committed();
        let guard = pin();

        for idx in self.candidates(key) {
            let live = self
                .bucket(idx)
                .latest_version(visible, &guard)
                .is_some_and(|entry| entry.holds(key));

            if live {
                self.bucket(idx).insert(txn, Entry::empty(), &guard);
                self.commit(txn);
                debug!(key, txn, bucket = idx, "key deleted");
                return Ok(true);
            }
        }

        trace!(key, txn, "delete found no live entry");
        Ok(false)
    }

    /// Captures the current read boundary for repeatable reads.
    pub fn snapshot(&self) -> Snapshot<'_, V> {
        Snapshot {
            table: self,
            version: self.last_committed(),
        }
    }

    /// Version of the last fully committed write.
    pub fn last_committed(&self) -> u64 {
        self.last_committed.load(Ordering::Acquire)
    }

    /// Number of transaction ids handed out so far, including failed writes.
    pub fn txn_counter(&self) -> u64 {
        self.txn_counter.load(Ordering::Acquire)
    }

    /// Number of buckets.
    pub fn size(&self) -> usize {
        self.buckets.len()
    }

    pub fn max_reach(&self) -> usize {
        self.max_reach
    }

    /// Live versions stored in bucket `idx`, newest first. Diagnostic only.
    pub fn bucket_versions(&self, idx: usize) -> Option<Vec<u64>> {
        self.buckets.get(idx).map(VersionedChain::snapshot)
    }
}

impl<V> Default for MvccTable<V>
where
    V: Copy + Eq + Default + Send + Sync + 'static,
{
    /// 512 buckets, 16 displacements.
    fn default() -> Self {
        Self::build(TableConfig::default())
    }
}

impl<V: 'static> std::fmt::Debug for MvccTable<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MvccTable")
            .field("size", &self.buckets.len())
            .field("max_reach", &self.max_reach)
            .field("txn_counter", &self.txn_counter.load(Ordering::Relaxed))
            .field(
                "last_committed",
                &self.last_committed.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// A fixed read version of a table.
///
/// Every read through the same snapshot observes the same state, regardless
/// of writes committed after it was taken.
#[derive(Clone, Copy)]
pub struct Snapshot<'t, V: 'static = u64> {
    table: &'t MvccTable<V>,
    version: u64,
}

impl<'t, V> Snapshot<'t, V>
where
    V: Copy + Eq + Default + Send + Sync + 'static,
{
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, key: u64) -> Option<V> {
        self.table.read_at(key, self.version)
    }
}
