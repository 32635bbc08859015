// Disk access for the provisioning pipeline
//
// The target disk is reached through the `BlockDevice` capability so the
// planner and stager run the same way against a device node, a loopback image
// or an in-memory disk. Every operation performs its own open/close cycle.

use anyhow::{Context, Result, bail};
use fatfs::{FatType, FormatVolumeOptions, FsOptions};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod common;
pub mod configuration;
mod linux;
pub mod memory;
pub mod partition;

pub use common::{DiskDevice, PartitionFileProxy, PartitionWindow};
pub use linux::LinuxDiskAccess;
pub use partition::{EspLocation, PartitionPlan};

/// FAT filesystem mounted over the ESP window of a disk handle
pub type EspFilesystem<H> = fatfs::FileSystem<PartitionFileProxy<H>>;

/// Longest FAT volume label
const VOLUME_LABEL_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Parameters for formatting the ESP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    pub volume_label: String,
}

impl FormatSpec {
    /// The label as stored on disk: uppercase, space padded, at most 11 bytes
    pub fn label_bytes(&self) -> [u8; VOLUME_LABEL_LEN] {
        let mut label = [b' '; VOLUME_LABEL_LEN];
        for (slot, byte) in label
            .iter_mut()
            .zip(self.volume_label.bytes().filter(|b| b.is_ascii_graphic()))
        {
            *slot = byte.to_ascii_uppercase();
        }
        label
    }
}

/// A whole disk that can be opened, partitioned and formatted.
///
/// Closing is dropping the handle returned by `open`.
pub trait BlockDevice: fmt::Debug {
    type Handle: Read + Write + Seek + fmt::Debug + 'static;

    /// Name used in log lines and error messages
    fn describe(&self) -> String;

    fn open(&self, mode: OpenMode) -> Result<Self::Handle>;

    /// Current capacity in bytes
    fn size_bytes(&self) -> Result<u64>;

    fn logical_sector_size(&self) -> u64 {
        common::DEFAULT_SECTOR_SIZE
    }

    /// Push written data to stable storage
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Write the GPT described by `plan` and confirm it reads back identically
    fn partition(&self, plan: &PartitionPlan) -> Result<()> {
        partition::write_partition_table(self, plan)?;
        partition::confirm_partition_table(self, plan)
    }

    /// Create a FAT32 filesystem over the planned ESP
    fn format(&self, plan: &PartitionPlan, spec: &FormatSpec) -> Result<()> {
        let bytes_per_sector = u16::try_from(plan.sector_size)
            .with_context(|| format!("Sector size {} too large for FAT", plan.sector_size))?;
        let total_sectors = u32::try_from(plan.esp_sectors())
            .with_context(|| format!("ESP of {} sectors too large for FAT32", plan.esp_sectors()))?;

        info!(
            "Formatting ESP on {} as FAT32 ({} sectors, label {:?})",
            self.describe(),
            total_sectors,
            spec.volume_label
        );

        let handle = self.open(OpenMode::ReadWrite)?;
        let mut proxy = PartitionFileProxy::new(handle, plan.window());

        let options = FormatVolumeOptions::new()
            .fat_type(FatType::Fat32)
            .volume_label(spec.label_bytes())
            .bytes_per_sector(bytes_per_sector)
            .total_sectors(total_sectors);

        fatfs::format_volume(&mut proxy, options).context("Failed to create FAT32 filesystem")?;
        proxy.flush().context("Failed to flush formatted ESP")?;
        drop(proxy);

        self.sync()
    }

    /// Mount the FAT filesystem found in `window`
    fn open_filesystem(&self, window: PartitionWindow, mode: OpenMode) -> Result<EspFilesystem<Self::Handle>> {
        let handle = self.open(mode)?;
        let mut proxy = PartitionFileProxy::new(handle, window);
        proxy.seek(SeekFrom::Start(0))?;

        debug!(
            offset = window.offset,
            size = window.size,
            "Opening FAT filesystem on {}",
            self.describe()
        );
        fatfs::FileSystem::new(proxy, FsOptions::new()).context("Failed to open FAT filesystem")
    }
}

/// A device node or disk image file
#[derive(Debug, Clone)]
pub struct DeviceFile {
    path: PathBuf,
    logical_sector_size: u64,
}

impl DeviceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            logical_sector_size: common::DEFAULT_SECTOR_SIZE,
        }
    }

    pub fn with_sector_size(path: impl Into<PathBuf>, logical_sector_size: u64) -> Self {
        Self {
            path: path.into(),
            logical_sector_size,
        }
    }

    /// Open an already partitioned disk, taking the sector size from its GPT.
    ///
    /// Falls back to 512 bytes when no GPT header is found.
    pub fn detect(path: impl Into<PathBuf>) -> Result<Self> {
        let mut device = Self::new(path);
        match partition::detect_sector_size(&device)? {
            Some(sector_size) => device.logical_sector_size = sector_size,
            None => debug!("No GPT header on {}, assuming 512-byte sectors", device.describe()),
        }
        Ok(device)
    }

    pub fn for_disk(disk: &DiskDevice) -> Self {
        Self {
            path: disk.path.clone(),
            logical_sector_size: disk.sector_size(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for DeviceFile {
    type Handle = File;

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self, mode: OpenMode) -> Result<File> {
        let mut options = OpenOptions::new();
        options.read(true);
        if mode == OpenMode::ReadWrite {
            options.write(true);
        }

        options
            .open(&self.path)
            .with_context(|| format!("Failed to open {} ({:?})", self.path.display(), mode))
    }

    fn size_bytes(&self) -> Result<u64> {
        let mut file = self.open(OpenMode::ReadOnly)?;
        let size = file
            .seek(SeekFrom::End(0))
            .with_context(|| format!("Failed to measure {}", self.path.display()))?;
        if size == 0 {
            bail!("{} reports a size of zero", self.path.display());
        }
        Ok(size)
    }

    fn logical_sector_size(&self) -> u64 {
        self.logical_sector_size
    }

    fn sync(&self) -> Result<()> {
        let file = self.open(OpenMode::ReadOnly)?;
        LinuxDiskAccess::fsync(&file)
            .with_context(|| format!("Failed to fsync {}", self.path.display()))?;
        LinuxDiskAccess::sync_filesystems();
        Ok(())
    }
}
