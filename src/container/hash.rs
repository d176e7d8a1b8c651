use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// Directory depth beyond which a split loop can only mean a broken
/// hash or a zero bucket size, both contract violations.
const MAX_GLOBAL_DEPTH: usize = 32;

/// A bucket holds up to bucket_size key/value pairs at a given local
/// depth. Buckets never shrink below their creation depth; a split
/// raises the depth and redistributes the entries.
struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Bucket { local_depth, items: Vec::new() }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite in place. The caller guarantees room for a
    /// genuinely new key.
    fn insert(&mut self, key: K, value: V) {
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.items.push((key, value)),
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }
}

/// An extendible hash table: a directory of 2^global_depth slots, each
/// pointing at a bucket of bounded size. Multiple slots alias one bucket
/// while the bucket's local depth is below the global depth; inserting
/// into a full bucket splits it, doubling the directory when the bucket
/// already uses every directory bit.
///
/// The directory holds handles into a grow-only bucket arena, so slot
/// aliasing is plain handle equality and a split rewrites exactly the
/// aliased slots.
///
/// This is the unsynchronized core; all the heavy lifting happens here.
/// Use [`SyncExtendibleHashTable`] for concurrent standalone access.
pub struct ExtendibleHashTable<K, V> {
    global_depth: usize,
    bucket_size: usize,
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> ExtendibleHashTable<K, V> {
    /// Create a table with a single empty bucket at depth zero.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size should be larger than zero");
        ExtendibleHashTable {
            global_depth: 0,
            bucket_size,
            dir: vec![0],
            buckets: vec![Bucket::new(0)],
        }
    }

    fn hash(key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize
    }

    /// Directory slot for a key: the low global_depth bits of its hash.
    fn index_of(&self, key: &K) -> usize {
        Self::hash(key) & ((1 << self.global_depth) - 1)
    }

    /// Number of hash bits used to index the directory.
    pub fn global_depth(&self) -> usize {
        self.global_depth
    }

    /// Number of hash bits used by the bucket behind the given
    /// directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        self.buckets[self.dir[dir_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Number of key/value pairs in the table.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let bucket = &self.buckets[self.dir[self.index_of(key)]];
        bucket.find(key).cloned()
    }

    /// Insert or overwrite. Splits the target bucket, doubling the
    /// directory when needed, until the key fits; a single split may be
    /// insufficient when every entry rehashes to the same side.
    pub fn insert(&mut self, key: K, value: V) {
        loop {
            let bucket_idx = self.dir[self.index_of(&key)];
            let bucket = &self.buckets[bucket_idx];
            if bucket.items.len() < self.bucket_size || bucket.contains(&key) {
                self.buckets[bucket_idx].insert(key, value);
                return;
            }
            self.split(bucket_idx);
        }
    }

    /// Remove the key, reporting whether it was present. Buckets are
    /// never coalesced and the directory never shrinks.
    pub fn remove(&mut self, key: &K) -> bool {
        let bucket_idx = self.dir[self.index_of(key)];
        self.buckets[bucket_idx].remove(key)
    }

    /// Split the given bucket: raise its local depth, allocate a sibling
    /// at the same depth, redistribute the entries on the new high bit
    /// and repoint the directory slots that hashed to the sibling side.
    fn split(&mut self, bucket_idx: usize) {
        if self.buckets[bucket_idx].local_depth == self.global_depth {
            // every directory bit is in use, double the directory by
            // duplicating each slot i at i + old_size with the same
            // bucket handle.
            self.dir.extend_from_within(..);
            self.global_depth += 1;
            assert!(
                self.global_depth <= MAX_GLOBAL_DEPTH,
                "extendible hash directory exceeded depth {}",
                MAX_GLOBAL_DEPTH
            );
        }

        let new_depth = self.buckets[bucket_idx].local_depth + 1;
        self.buckets[bucket_idx].local_depth = new_depth;
        let sibling_idx = self.buckets.len();
        self.buckets.push(Bucket::new(new_depth));

        // entries whose hash has the new bit set move to the sibling.
        let bit = 1 << (new_depth - 1);
        let items = std::mem::take(&mut self.buckets[bucket_idx].items);
        for (k, v) in items {
            if Self::hash(&k) & bit == 0 {
                self.buckets[bucket_idx].items.push((k, v));
            } else {
                self.buckets[sibling_idx].items.push((k, v));
            }
        }

        for i in 0..self.dir.len() {
            if self.dir[i] == bucket_idx && i & bit != 0 {
                self.dir[i] = sibling_idx;
            }
        }
    }
}

/// SyncExtendibleHashTable is the thread-safe version of
/// ExtendibleHashTable, basically all the heavy lifting happens in the
/// inner table.
pub struct SyncExtendibleHashTable<K, V> {
    inner: Mutex<ExtendibleHashTable<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> SyncExtendibleHashTable<K, V> {
    pub fn new(bucket_size: usize) -> Self {
        SyncExtendibleHashTable { inner: Mutex::new(ExtendibleHashTable::new(bucket_size)) }
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock().unwrap();
        guard.find(key)
    }

    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(key, value)
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(key)
    }

    pub fn global_depth(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.global_depth()
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.local_depth(dir_index)
    }

    pub fn num_buckets(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.num_buckets()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
