// In-memory block device, used to exercise the planner and stager without a real disk

use anyhow::Result;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use super::{BlockDevice, OpenMode};
use crate::disk::common::DEFAULT_SECTOR_SIZE;

/// A fixed-size disk held in memory.
///
/// Clones share the same buffer, and every `open` yields an independent cursor.
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    data: Arc<Mutex<Vec<u8>>>,
    sector_size: u64,
}

impl MemoryDisk {
    pub fn new(size_bytes: usize) -> Self {
        Self::with_sector_size(size_bytes, DEFAULT_SECTOR_SIZE)
    }

    pub fn with_sector_size(size_bytes: usize, sector_size: u64) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0u8; size_bytes])),
            sector_size,
        }
    }

    /// Copy of the current disk contents
    pub fn snapshot(&self) -> io::Result<Vec<u8>> {
        Ok(lock(&self.data)?.clone())
    }
}

fn lock(data: &Mutex<Vec<u8>>) -> io::Result<std::sync::MutexGuard<'_, Vec<u8>>> {
    data.lock()
        .map_err(|_| io::Error::other("memory disk lock poisoned"))
}

impl BlockDevice for MemoryDisk {
    type Handle = MemoryHandle;

    fn describe(&self) -> String {
        format!("memory disk ({} bytes)", self.size_bytes().unwrap_or(0))
    }

    fn open(&self, mode: OpenMode) -> Result<Self::Handle> {
        Ok(MemoryHandle {
            data: Arc::clone(&self.data),
            position: 0,
            writable: mode == OpenMode::ReadWrite,
        })
    }

    fn size_bytes(&self) -> Result<u64> {
        Ok(lock(&self.data)?.len() as u64)
    }

    fn logical_sector_size(&self) -> u64 {
        self.sector_size
    }
}

/// Cursor over a `MemoryDisk`
#[derive(Debug)]
pub struct MemoryHandle {
    data: Arc<Mutex<Vec<u8>>>,
    position: u64,
    writable: bool,
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = lock(&self.data)?;
        let start = std::cmp::min(self.position, data.len() as u64) as usize;
        let count = std::cmp::min(buf.len(), data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        drop(data);

        self.position += count as u64;
        Ok(count)
    }
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory disk opened read-only",
            ));
        }

        let mut data = lock(&self.data)?;
        let start = std::cmp::min(self.position, data.len() as u64) as usize;
        let count = std::cmp::min(buf.len(), data.len() - start);
        if count == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write past the end of the memory disk",
            ));
        }
        data[start..start + count].copy_from_slice(&buf[..count]);
        drop(data);

        self.position += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = lock(&self.data)?.len() as u64;
        let new_position = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
            SeekFrom::End(offset) => len.checked_add_signed(offset),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid seek"))?;

        self.position = new_position;
        Ok(new_position)
    }
}
