use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::storage::page::FrameId;

/// Replacer tracks frame usage for replacement in case the buffer pool
/// is full.
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame id is accessed at current
    /// timestamp. Create a new entry for access history if frame id has
    /// not been seen before; new frames start non-evictable.
    fn record_access(&self, frame_id: FrameId);

    /// Find the frame to evict with the replacement policy. Only frames
    /// that are marked as evictable are candidates for eviction.
    ///
    /// Successful eviction of a frame decrements the size of the
    /// replacer and removes the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if
    /// no frames can be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. This also
    /// controls the replacer size: size is the number of evictable
    /// entries.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Check if a frame is evictable. If the frame is not found, return
    /// true.
    fn is_evictable(&self, frame_id: FrameId) -> bool;

    /// Remove a frame from the replacer, along with its access history,
    /// no matter what the policy would pick. Removing a non-evictable
    /// frame is a usage error; removing an untracked frame does nothing.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Number of currently evictable frames.
    fn size(&self) -> usize;
}

/// The two disjoint tiers a tracked frame can live in.
#[derive(Copy, Clone, PartialEq)]
enum Tier {
    /// Fewer than k recorded accesses; evicted in classic LRU order.
    History,
    /// At least k recorded accesses; ordered by the k-distance anchor.
    Cache,
}

/// Per-frame tracking state. The timestamp is the frame's current
/// ordering key in its tier: the last access time while in history, the
/// k-distance anchor once in cache.
struct FrameEntry {
    access_count: usize,
    timestamp: u64,
    tier: Tier,
    evictable: bool,
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts the frame whose backward k-distance is the
/// maximum of all frames, where backward k-distance is the difference in
/// time between the current timestamp and the timestamp of the k-th
/// previous access.
///
/// A frame with fewer than k recorded accesses has +inf backward
/// k-distance and lives in the history tier, evicted first in classic
/// LRU order. Frames with k or more accesses live in the cache tier,
/// ordered by their k-distance anchor, which each access refreshes to
/// the current timestamp. Timestamps are a monotone per-replacer
/// counter, never reset.
///
/// This is the unsynchronized core; use [`SyncLRUKReplacer`] for
/// concurrent access.
pub struct LRUKReplacer {
    k: usize,
    current_timestamp: u64,
    current_size: usize,
    entries: HashMap<FrameId, FrameEntry>,
    /// (timestamp, frame) pairs per tier, scanned in order on evict.
    history: BTreeSet<(u64, FrameId)>,
    cache: BTreeSet<(u64, FrameId)>,
}

impl LRUKReplacer {
    pub fn new(k: usize) -> Self {
        assert!(k > 0, "replacer k should be larger than zero");
        LRUKReplacer {
            k,
            current_timestamp: 0,
            current_size: 0,
            entries: HashMap::new(),
            history: BTreeSet::new(),
            cache: BTreeSet::new(),
        }
    }

    fn record_access(&mut self, frame_id: FrameId) {
        let now = self.current_timestamp;
        self.current_timestamp += 1;

        match self.entries.get_mut(&frame_id) {
            Some(entry) => {
                entry.access_count += 1;
                match entry.tier {
                    Tier::Cache => {
                        // refresh the anchor
                        self.cache.remove(&(entry.timestamp, frame_id));
                        entry.timestamp = now;
                        self.cache.insert((now, frame_id));
                    }
                    Tier::History if entry.access_count >= self.k => {
                        // promote to the cache tier
                        self.history.remove(&(entry.timestamp, frame_id));
                        entry.timestamp = now;
                        entry.tier = Tier::Cache;
                        self.cache.insert((now, frame_id));
                    }
                    Tier::History => {
                        self.history.remove(&(entry.timestamp, frame_id));
                        entry.timestamp = now;
                        self.history.insert((now, frame_id));
                    }
                }
            }
            None => {
                let tier = if self.k == 1 { Tier::Cache } else { Tier::History };
                self.entries.insert(
                    frame_id,
                    FrameEntry { access_count: 1, timestamp: now, tier, evictable: false },
                );
                match tier {
                    Tier::Cache => self.cache.insert((now, frame_id)),
                    Tier::History => self.history.insert((now, frame_id)),
                };
            }
        }
    }

    /// Pick the victim: the oldest evictable history frame, or failing
    /// that the evictable cache frame with the smallest anchor, and drop
    /// all tracking for it.
    fn evict(&mut self) -> Option<FrameId> {
        let victim = self
            .history
            .iter()
            .chain(self.cache.iter())
            .find(|(_, id)| self.entries[id].evictable)
            .map(|&(_, id)| id)?;

        self.drop_entry(victim);
        self.current_size -= 1;
        Some(victim)
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let entry = match self.entries.get_mut(&frame_id) {
            Some(entry) => entry,
            None => return,
        };
        if entry.evictable == evictable {
            return;
        }
        entry.evictable = evictable;
        if evictable {
            self.current_size += 1;
        } else {
            self.current_size -= 1;
        }
    }

    fn is_evictable(&self, frame_id: FrameId) -> bool {
        match self.entries.get(&frame_id) {
            Some(entry) => entry.evictable,
            None => true,
        }
    }

    fn remove(&mut self, frame_id: FrameId) -> Result<()> {
        let entry = match self.entries.get(&frame_id) {
            Some(entry) => entry,
            None => return Ok(()),
        };
        if !entry.evictable {
            return Err(Error::value(format!("removing non-evictable frame {}", frame_id)));
        }
        self.drop_entry(frame_id);
        self.current_size -= 1;
        Ok(())
    }

    fn size(&self) -> usize {
        self.current_size
    }

    fn drop_entry(&mut self, frame_id: FrameId) {
        let entry = self.entries.remove(&frame_id).unwrap();
        match entry.tier {
            Tier::History => self.history.remove(&(entry.timestamp, frame_id)),
            Tier::Cache => self.cache.remove(&(entry.timestamp, frame_id)),
        };
    }
}

/// SyncLRUKReplacer implements the thread-safe version of the LRU-k
/// replacement policy, basically all the heavy lifting happens in the
/// LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(k: usize) -> Self {
        SyncLRUKReplacer { inner: Mutex::new(LRUKReplacer::new(k)) }
    }
}

impl Replacer for SyncLRUKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock().unwrap();
        guard.record_access(frame_id)
    }

    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.set_evictable(frame_id, evictable)
    }

    fn is_evictable(&self, frame_id: FrameId) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.is_evictable(frame_id)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(frame_id)
    }

    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}
