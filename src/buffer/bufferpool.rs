use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::Config;
use crate::container::hash::ExtendibleHashTable;
use crate::error::{Error, Result};
use crate::storage::page::{FrameId, Page, PageId, INVALID_PAGE_ID};
use crate::storage::{new_disk_manager, DiskManager};

use super::replacer::{Replacer, SyncLRUKReplacer};

/// Key/value capacity of a page table bucket.
const PAGE_TABLE_BUCKET_SIZE: usize = 4;

/// The buffer pool is responsible for moving physical pages back and forth
/// from main memory to disk. It allows a DBMS to support databases that are
/// larger than the amount of memory available to the system.
///
/// The buffer pool's operations are transparent to other parts in the system.
/// For example, the system asks the buffer pool for a page using its unique
/// identifier (page_id) and it does not know whether that page is already in
/// memory or whether the system has to retrieve it from disk.
struct BufferPool {
    pool_size: usize,
    /// page-addressed backing store.
    disk: Box<dyn DiskManager>,
    /// array of buffer pool pages. use the array index as
    /// FrameId, i.e., the FrameId is in range: [0, pool_size).
    pages: Vec<Arc<Page>>,
    /// page table for keeping track of buffer pool pages.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// list of free frames that don't have any pages on them.
    free_list: VecDeque<FrameId>,
    /// Replacer to find unpinned frames for replacement.
    replacer: Arc<dyn Replacer>,
    /// The next page id to be allocated.
    /// TODO: persist this info across restarts.
    next_page_id: PageId,
}

impl BufferPool {
    fn new(disk: Box<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        let page_table = ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE);
        let replacer: Arc<dyn Replacer> = Arc::new(SyncLRUKReplacer::new(replacer_k));
        for i in 0..pool_size {
            pages.push(Arc::new(Page::new()));
            // initially, every frame is in the free list
            free_list.push_back(i);
        }
        BufferPool { pool_size, disk, pages, page_table, free_list, replacer, next_page_id: 0 }
    }

    /// Take a frame for a new resident: from the free list if any, else
    /// by evicting a victim, writing its old content back if dirty and
    /// unlinking it from the page table. The returned frame is cleared.
    fn take_frame(&mut self) -> Result<FrameId> {
        let frame_id = match self.free_list.pop_front() {
            Some(frame_id) => frame_id,
            // no free frame available, try to evict one
            None => self.replacer.evict().ok_or(Error::NoAvailableFrame)?,
        };

        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        let prev_page_id = guard.id;

        // flush the outgoing page before the frame loses it. on a write
        // failure the frame stays dirty and resident and the error
        // surfaces to the caller.
        if guard.is_dirty {
            self.disk.write_page(prev_page_id, &guard.data)?;
        }
        if prev_page_id != INVALID_PAGE_ID {
            self.page_table.remove(&prev_page_id);
            debug!("evicted page {} from frame {}", prev_page_id, frame_id);
        }
        guard.clear();

        Ok(frame_id)
    }

    /// Pin the frame as the new home of page_id: pin count 1, access
    /// recorded, non-evictable, linked in the page table.
    fn install_page(&mut self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let mut guard = self.pages[frame_id].write()?;
        guard.id = page_id;
        guard.pin_count = 1;
        drop(guard);

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        Ok(())
    }

    /// Create a new page in the buffer pool, return the newly created page
    /// or Error::NoAvailableFrame if all frames are currently in use and
    /// not evictable (in another word, pinned).
    fn new_page(&mut self) -> Result<Arc<Page>> {
        let frame_id = self.take_frame()?;
        let page_id = self.allocate_page();
        self.install_page(frame_id, page_id)?;
        Ok(Arc::clone(&self.pages[frame_id]))
    }

    /// Fetch the requested page with the given page id from the buffer
    /// pool. Return Error::NoAvailableFrame if the page needs to be
    /// fetched from disk but all frames are currently in use and not
    /// evictable (in other words, pinned).
    fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<Page>> {
        if page_id == INVALID_PAGE_ID {
            return Err(Error::value("fetching the invalid page id"));
        }

        // check if the page table has the page id already; if so pin it,
        // record the access and return it.
        if let Some(frame_id) = self.page_table.find(&page_id) {
            let page = Arc::clone(&self.pages[frame_id]);
            let mut guard = page.write()?;
            guard.pin_count += 1;
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);

            drop(guard);
            return Ok(page);
        }

        // page not resident, bring it in from disk
        let frame_id = self.take_frame()?;
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        self.disk.read_page(page_id, &mut guard.data)?;
        drop(guard);
        self.install_page(frame_id, page_id)?;

        Ok(page)
    }

    /// Unpin the target page from the buffer pool. If page_id is not in
    /// the buffer pool or its pin count is already 0, return false.
    ///
    /// Decrement the pin count of the page. If the pin count reaches 0,
    /// the frame becomes evictable by the replacer. A true is_dirty sets
    /// the dirty flag; dirtiness sticks until a flush or frame reuse, so
    /// a false never clears it.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        let mut guard = self.pages[frame_id].write()?;
        if guard.pin_count <= 0 {
            // double unpin is a usage error
            return Ok(false);
        }
        guard.pin_count -= 1;
        if guard.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        if is_dirty {
            guard.is_dirty = true;
        }
        Ok(true)
    }

    /// Flush the target page to disk regardless of the dirty flag and
    /// unset the dirty flag of the page after flushing.
    ///
    /// Return false if the page cannot be found in the page table, true
    /// otherwise.
    fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        let mut guard = self.pages[frame_id].write()?;
        self.disk.write_page(guard.id, &guard.data)?;
        guard.is_dirty = false;
        Ok(true)
    }

    /// Flush all the resident pages in the buffer pool to disk.
    fn flush_all_pages(&mut self) -> Result<()> {
        for page in &self.pages {
            let mut guard = page.write()?;
            if guard.id == INVALID_PAGE_ID {
                continue;
            }
            self.disk.write_page(guard.id, &guard.data)?;
            guard.is_dirty = false;
        }
        self.disk.flush()
    }

    /// Delete a page from the buffer pool. If the page is not in the
    /// buffer pool, do nothing and return true. If the page is pinned
    /// and cannot be deleted, return false immediately.
    ///
    /// After unlinking the page from the page table, stop tracking the
    /// frame in the replacer, add the frame back to the free list, reset
    /// the frame's memory and metadata, and deallocate the page on disk.
    fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            // not resident, vacuously deleted
            None => return Ok(true),
        };
        let mut guard = self.pages[frame_id].write()?;
        if guard.pin_count > 0 {
            debug_assert!(!self.replacer.is_evictable(frame_id));
            return Ok(false);
        }
        self.page_table.remove(&page_id);
        // the frame must be evictable before the replacer lets go of it
        self.replacer.set_evictable(frame_id, true);
        self.replacer.remove(frame_id)?;
        self.free_list.push_back(frame_id);
        guard.clear();
        drop(guard);
        self.disk.deallocate_page(page_id)?;

        Ok(true)
    }

    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }
}

/// Buffer pool manager wraps the buffer pool with a mutex for concurrent
/// access, basically all the heavy lifting happens in the buffer pool.
pub struct BufferPoolManager {
    /// hold the actual buffer pool protected by a mutex latch.
    /// TODO: we need more granular concurrency control instead
    ///  of having this mutex latch all the operations.
    inner: Arc<Mutex<BufferPool>>,
}

impl BufferPoolManager {
    pub fn new(disk: Box<dyn DiskManager>, pool_size: usize, replacer_k: usize) -> Self {
        debug!("buffer pool with {} frames, lru-{} replacement", pool_size, replacer_k);
        let inner = BufferPool::new(disk, pool_size, replacer_k);
        BufferPoolManager { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Build the pool and its backing disk manager from a config.
    pub fn from_config(cfg: Config) -> Result<Self> {
        let disk = new_disk_manager(cfg.disk_type, &cfg.path)?;
        Ok(Self::new(disk, cfg.pool_size, cfg.replacer_k))
    }

    pub fn pool_size(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.pool_size
    }

    /// Create a new page in the buffer pool.
    pub fn new_page(&self) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.new_page()
    }

    /// Fetch the requested page with the given page id from the buffer pool.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.fetch_page(page_id)
    }

    /// Unpin the target page from the buffer pool. If page_id is not in
    /// the buffer pool or its pin count is already 0, return false.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<bool> {
        let inner = self.inner.lock()?;
        inner.unpin_page(page_id, is_dirty)
    }

    /// Flush the target page to disk regardless of the dirty flag and
    /// unset the dirty flag of the page after flushing.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.flush_page(page_id)
    }

    /// Flush all the resident pages in the buffer pool to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.flush_all_pages()
    }

    /// Delete a page from the buffer pool. If the page is not in the
    /// buffer pool, do nothing and return true. If the page is pinned
    /// and cannot be deleted, return false immediately.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.delete_page(page_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::disk::MemoryDisk;

    use super::*;

    fn new_pool(pool_size: usize, replacer_k: usize) -> BufferPoolManager {
        BufferPoolManager::new(Box::new(MemoryDisk::new()), pool_size, replacer_k)
    }

    #[test]
    fn test_buffer_pool_basic() -> Result<()> {
        let buffer_pool_size = 10;
        let bpm = new_pool(buffer_pool_size, 5);

        // Scenario: The buffer pool is empty, we should be able to create
        // a new page.
        let page0 = bpm.new_page()?;
        let page0_id = page0.read()?.id;
        assert_eq!(0, page0_id);

        // Scenario: Once we have a page, we should be able to read and
        // write the content.
        let mut guard = page0.write()?;
        guard.data[..5].copy_from_slice(b"hello");
        drop(guard);
        let guard = page0.read()?;
        assert_eq!(b"hello", &guard.data[..5]);
        drop(guard);

        // Scenario: we should be able to create pages until we fill up
        // the buffer pool.
        for _ in 1..buffer_pool_size {
            assert!(bpm.new_page().is_ok());
        }
        // Scenario: once the buffer pool is full, we should not be able
        // to create any new page.
        for _ in buffer_pool_size..buffer_pool_size * 2 {
            assert_eq!(Err(Error::NoAvailableFrame), bpm.new_page().map(|_| ()));
        }
        // Scenario: after unpinning pages {0, 1, 2, 3, 4} and pinning
        // another 4 new pages, there would still be one buffer frame
        // left for reading page 0.
        for i in 0..5 {
            assert_eq!(true, bpm.unpin_page(i, true)?);
        }
        for _ in 0..4 {
            assert!(bpm.new_page().is_ok());
        }
        // Scenario: we should be able to fetch the data we wrote a while
        // ago.
        let page0 = bpm.fetch_page(0)?;
        let guard = page0.read()?;
        assert_eq!(b"hello", &guard.data[..5]);
        drop(guard);
        // Scenario: if we unpin page 0 and then make a new page, all the
        // buffer frames are pinned again and fetching page 0 should fail.
        assert_eq!(true, bpm.unpin_page(0, true)?);
        assert!(bpm.new_page().is_ok());
        assert_eq!(Err(Error::NoAvailableFrame), bpm.fetch_page(0).map(|_| ()));

        Ok(())
    }

    #[test]
    fn test_fetch_invalid_page_id() {
        let bpm = new_pool(3, 2);
        assert!(bpm.fetch_page(INVALID_PAGE_ID).is_err());
    }

    #[test]
    fn test_pin_evictable_invariant() -> Result<()> {
        let bpm = new_pool(3, 2);

        // a pinned frame is never evictable, an unpinned one always is
        let page0 = bpm.new_page()?;
        let page0_id = page0.read()?.id;
        {
            let inner = bpm.inner.lock()?;
            assert_eq!(0, inner.replacer.size());
        }

        bpm.unpin_page(page0_id, false)?;
        {
            let inner = bpm.inner.lock()?;
            assert_eq!(1, inner.replacer.size());
        }

        // pinning it again via fetch flips it back
        bpm.fetch_page(page0_id)?;
        {
            let inner = bpm.inner.lock()?;
            assert_eq!(0, inner.replacer.size());
        }

        Ok(())
    }

    #[test]
    fn test_page_table_tracks_residency() -> Result<()> {
        let bpm = new_pool(3, 2);

        let mut ids = vec![];
        for _ in 0..3 {
            let page = bpm.new_page()?;
            ids.push(page.read()?.id);
        }

        // every resident page maps to the frame that holds it, uniquely
        {
            let inner = bpm.inner.lock()?;
            assert_eq!(3, inner.page_table.len());
            let mut frames = vec![];
            for id in &ids {
                let frame_id = inner.page_table.find(id).unwrap();
                assert_eq!(*id, inner.pages[frame_id].read()?.id);
                frames.push(frame_id);
            }
            frames.sort();
            frames.dedup();
            assert_eq!(3, frames.len());
        }

        // deleting a page drops its mapping
        bpm.unpin_page(ids[0], false)?;
        assert_eq!(true, bpm.delete_page(ids[0])?);
        {
            let inner = bpm.inner.lock()?;
            assert_eq!(2, inner.page_table.len());
            assert_eq!(None, inner.page_table.find(&ids[0]));
        }

        Ok(())
    }

    #[test]
    fn test_flush_clears_dirty_flag() -> Result<()> {
        let bpm = new_pool(3, 2);

        let page0 = bpm.new_page()?;
        let page0_id = {
            let mut guard = page0.write()?;
            guard.data[..3].copy_from_slice(b"abc");
            guard.id
        };
        bpm.unpin_page(page0_id, true)?;
        assert_eq!(true, page0.read()?.is_dirty);

        assert_eq!(true, bpm.flush_page(page0_id)?);
        assert_eq!(false, page0.read()?.is_dirty);

        // flushing a non-resident page reports false
        assert_eq!(false, bpm.flush_page(42)?);

        Ok(())
    }

    #[test]
    fn test_unpin_dirty_flag_sticks() -> Result<()> {
        let bpm = new_pool(3, 2);

        let page0 = bpm.new_page()?;
        let page0_id = page0.read()?.id;

        // a clean unpin after a dirty pin must not wash out the dirty flag
        bpm.unpin_page(page0_id, true)?;
        bpm.fetch_page(page0_id)?;
        bpm.unpin_page(page0_id, false)?;
        assert_eq!(true, page0.read()?.is_dirty);

        Ok(())
    }
}
