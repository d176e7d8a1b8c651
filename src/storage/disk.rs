use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::storage::page::{PageId, PAGE_SIZE};
use crate::storage::DiskManager;

fn check_page_io(id: PageId, buf: &[u8]) -> Result<()> {
    if id < 0 {
        return Err(Error::value(format!("invalid page id {}", id)));
    }
    if buf.len() != PAGE_SIZE {
        return Err(Error::value(format!("page buffer size {} != {}", buf.len(), PAGE_SIZE)));
    }
    Ok(())
}

/// An in-memory page store backed by a BTreeMap, mainly for tests.
#[derive(Debug)]
pub struct MemoryDisk {
    pages: BTreeMap<PageId, Vec<u8>>,
}

impl MemoryDisk {
    pub fn new() -> MemoryDisk {
        MemoryDisk { pages: BTreeMap::new() }
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        MemoryDisk::new()
    }
}

impl DiskManager for MemoryDisk {
    fn read_page(&mut self, id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_io(id, buf)?;
        match self.pages.get(&id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, id: PageId, buf: &[u8]) -> Result<()> {
        check_page_io(id, buf)?;
        self.pages.insert(id, buf.to_vec());
        Ok(())
    }

    fn deallocate_page(&mut self, id: PageId) -> Result<()> {
        self.pages.remove(&id);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A page store over a flat file. Page n lives at byte offset
/// n * PAGE_SIZE; reads past the end of the file yield zeroes so a
/// freshly allocated page id is readable before its first write.
#[derive(Debug)]
pub struct FileDisk {
    file: File,
}

impl FileDisk {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileDisk> {
        let file =
            OpenOptions::new().read(true).write(true).create(true).open(path.as_ref())?;
        debug!("opened disk file {:?}", path.as_ref());
        Ok(FileDisk { file })
    }

    fn offset(id: PageId) -> u64 {
        id as u64 * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDisk {
    fn read_page(&mut self, id: PageId, buf: &mut [u8]) -> Result<()> {
        check_page_io(id, buf)?;
        let offset = Self::offset(id);
        let len = self.file.metadata()?.len();
        // pages are written whole, so anything past the end of the
        // file has never been written.
        if offset + PAGE_SIZE as u64 > len {
            buf.fill(0);
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&mut self, id: PageId, buf: &[u8]) -> Result<()> {
        check_page_io(id, buf)?;
        self.file.seek(SeekFrom::Start(Self::offset(id)))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn deallocate_page(&mut self, _id: PageId) -> Result<()> {
        // the flat file keeps no allocation state, the offset simply
        // becomes reusable once the buffer pool hands the id out again.
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
