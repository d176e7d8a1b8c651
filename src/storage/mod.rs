use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

pub mod disk;
pub mod page;

use self::page::PageId;

/// A block-addressable page store. Pages are fixed-size byte buffers
/// addressed by their PageId; the store keeps no structure beyond that.
/// Writes are only guaranteed durable after calling flush().
///
/// The DiskManager trait is designed as `trait object` compatible so the
/// buffer pool can own whichever backing store the deployment picks via
/// `Box<dyn DiskManager>`.
pub trait DiskManager: Debug + Send {
    /// Fill buf (page-sized) with the content of the given page. A page
    /// that was never written reads as zeroes.
    fn read_page(&mut self, id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Write buf (page-sized) to the given page, overwriting the previous
    /// content if any.
    fn write_page(&mut self, id: PageId, buf: &[u8]) -> Result<()>;

    /// Mark the page reusable. Implementations may treat this as a no-op.
    fn deallocate_page(&mut self, id: PageId) -> Result<()>;

    /// Flushes any buffered data to the underlying storage medium.
    fn flush(&mut self) -> Result<()>;
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Memory,
    File,
}

pub fn new_disk_manager(typ: DiskType, path: &str) -> Result<Box<dyn DiskManager>> {
    match typ {
        DiskType::Memory => Ok(Box::new(disk::MemoryDisk::new())),
        DiskType::File => Ok(Box::new(disk::FileDisk::open(path)?)),
    }
}
