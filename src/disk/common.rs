// Common disk types shared by the inventory, the planner and the stager

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::debug;

/// Sector size assumed when the kernel reports none
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

const GIB: f64 = 1024f64 * 1024f64 * 1024f64;
const MIB: f64 = 1024f64 * 1024f64;

/// Disk device information structure.
///
/// An immutable snapshot taken at enumeration time; it goes stale if the
/// hardware changes mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDevice {
    /// Kernel device name (e.g. "vda")
    pub name: String,
    /// Device node (e.g. "/dev/vda")
    pub path: PathBuf,
    /// Capacity in bytes, if the kernel reported one
    pub size_bytes: Option<u64>,
    /// Logical sector size in bytes (0 when unknown)
    pub logical_sector_size: u64,
    /// Physical sector size in bytes (0 when unknown)
    pub physical_sector_size: u64,
    /// Human-readable model string
    pub model: String,
}

impl DiskDevice {
    /// Entry offered when enumeration finds nothing
    pub fn placeholder() -> Self {
        Self {
            name: "unknown".to_string(),
            path: PathBuf::from("/dev/unknown"),
            size_bytes: Some(0),
            logical_sector_size: 0,
            physical_sector_size: 0,
            model: "unknown".to_string(),
        }
    }

    /// Logical sector size, defaulting to 512 when the device reports zero
    pub fn sector_size(&self) -> u64 {
        if self.logical_sector_size == 0 {
            DEFAULT_SECTOR_SIZE
        } else {
            self.logical_sector_size
        }
    }

    pub fn total_sectors(&self) -> u64 {
        self.size_bytes.unwrap_or(0) / self.sector_size()
    }

    /// Copy of this snapshot with a freshly measured capacity
    pub fn with_size(&self, size_bytes: u64) -> Self {
        Self {
            size_bytes: Some(size_bytes),
            ..self.clone()
        }
    }

    /// Size as shown to the operator
    pub fn display_size(&self) -> String {
        match self.size_bytes {
            Some(0) if self.name == "unknown" => "0".to_string(),
            Some(bytes) => format_size(bytes),
            None => "unknown".to_string(),
        }
    }
}

impl std::fmt::Display for DiskDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} — {} — {}", self.name, self.display_size(), self.model)
    }
}

/// Render a byte count as GiB with one decimal when at least 1 GiB, else whole MiB
pub fn format_size(bytes: u64) -> String {
    let gib = bytes as f64 / GIB;
    if gib >= 1.0 {
        return format!("{:.1}G", gib);
    }
    format!("{:.0}M", bytes as f64 / MIB)
}

/// Byte range of one partition on a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionWindow {
    pub offset: u64,
    pub size: u64,
}

/// Proxy for accessing a specific partition on a disk.
///
/// All positions are relative to the start of the partition and reads and
/// writes are clipped at its end.
#[derive(Debug)]
pub struct PartitionFileProxy<T: Read + Write + Seek> {
    /// The underlying handle for the entire disk
    file: T,
    /// The offset in bytes where the partition starts
    partition_offset: u64,
    /// The size of the partition in bytes
    partition_size: u64,
    /// The current position relative to the start of the partition
    current_position: u64,
}

impl<T: Read + Write + Seek> PartitionFileProxy<T> {
    pub fn new(file: T, window: PartitionWindow) -> Self {
        Self {
            file,
            partition_offset: window.offset,
            partition_size: window.size,
            current_position: 0,
        }
    }

    /// Give back the underlying disk handle
    pub fn into_inner(self) -> T {
        self.file
    }

    /// Convert a partition-relative position to an absolute disk position
    fn to_absolute_position(&self) -> u64 {
        self.partition_offset + self.current_position
    }

    /// Bytes left between the current position and the end of the partition
    fn remaining(&self) -> u64 {
        self.partition_size.saturating_sub(self.current_position)
    }
}

impl<T: Read + Write + Seek> Read for PartitionFileProxy<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max_read_size = std::cmp::min(buf.len() as u64, self.remaining()) as usize;
        if max_read_size == 0 {
            return Ok(0);
        }

        let current_abs_pos = self.to_absolute_position();
        self.file.seek(SeekFrom::Start(current_abs_pos))?;
        let bytes_read = self.file.read(&mut buf[..max_read_size])?;

        self.current_position += bytes_read as u64;
        Ok(bytes_read)
    }
}

impl<T: Read + Write + Seek> Write for PartitionFileProxy<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let max_write_size = std::cmp::min(buf.len() as u64, self.remaining()) as usize;
        if max_write_size == 0 && !buf.is_empty() {
            debug!("Write at partition boundary, nothing written");
            return Ok(0);
        }

        let current_abs_pos = self.to_absolute_position();
        self.file.seek(SeekFrom::Start(current_abs_pos))?;
        let bytes_written = self.file.write(&buf[..max_write_size])?;

        self.current_position += bytes_written as u64;
        Ok(bytes_written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl<T: Read + Write + Seek> Seek for PartitionFileProxy<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_position = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.current_position.checked_add_signed(offset),
            SeekFrom::End(offset) => self.partition_size.checked_add_signed(offset),
        };

        let new_position = new_position.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid seek to a negative or overflowing position",
            )
        })?;

        if new_position > self.partition_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Position {} is beyond partition size {}",
                    new_position, self.partition_size
                ),
            ));
        }

        // The underlying handle is only positioned on the next read or write
        self.current_position = new_position;
        Ok(new_position)
    }
}
