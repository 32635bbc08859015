// Partition planning and GPT writing for the target disk

use anyhow::{Context, Result, anyhow, bail};
use gpt::GptConfig;
use gpt::disk::LogicalBlockSize;
use gpt::mbr::ProtectiveMBR;
use gpt::partition::Partition;
use gpt::partition_types;
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, info};
use uuid::Uuid;

use super::{BlockDevice, OpenMode};
use crate::disk::common::{DEFAULT_SECTOR_SIZE, DiskDevice, PartitionWindow};
use crate::error::InstallError;

/// Sectors kept free at the start of the disk (alignment, protective MBR, primary GPT)
pub const RESERVED_HEAD_SECTORS: u64 = 2048;
/// Sectors kept free at the end of the disk (backup GPT)
pub const RESERVED_TAIL_SECTORS: u64 = 2048;

pub const ESP_PARTITION_ID: u32 = 1;
pub const ESP_PARTITION_NAME: &str = "EFI System";

/// Sector-aligned layout of the target disk: one EFI System Partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub sector_size: u64,
    pub total_sectors: u64,
    pub protective_mbr: bool,
    /// First sector of the ESP
    pub start: u64,
    /// Last sector of the ESP, inclusive
    pub end: u64,
}

impl PartitionPlan {
    /// Compute the layout for a disk of `total_sectors` sectors.
    ///
    /// A zero sector size is treated as 512. Fails with `DiskTooSmall` when
    /// the reserved regions leave no room for the ESP.
    pub fn for_geometry(total_sectors: u64, sector_size: u64) -> Result<Self, InstallError> {
        let sector_size = if sector_size == 0 {
            DEFAULT_SECTOR_SIZE
        } else {
            sector_size
        };

        let start = RESERVED_HEAD_SECTORS;
        let end = total_sectors.saturating_sub(RESERVED_TAIL_SECTORS);
        if end <= start {
            return Err(InstallError::DiskTooSmall {
                total_sectors,
                minimum: RESERVED_HEAD_SECTORS + RESERVED_TAIL_SECTORS,
            });
        }

        Ok(Self {
            sector_size,
            total_sectors,
            protective_mbr: true,
            start,
            end,
        })
    }

    /// Number of sectors covered by the ESP
    pub fn esp_sectors(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Byte range of the ESP on the disk
    pub fn window(&self) -> PartitionWindow {
        PartitionWindow {
            offset: self.start * self.sector_size,
            size: self.esp_sectors() * self.sector_size,
        }
    }
}

/// Plan the GPT layout for a disk snapshot
pub fn plan(disk: &DiskDevice) -> Result<PartitionPlan, InstallError> {
    let plan = PartitionPlan::for_geometry(disk.total_sectors(), disk.sector_size())?;
    debug!(
        disk = %disk.name,
        start = plan.start,
        end = plan.end,
        total = plan.total_sectors,
        "Planned GPT layout"
    );
    Ok(plan)
}

/// The first partition as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EspLocation {
    pub first_lba: u64,
    pub last_lba: u64,
    pub sector_size: u64,
    pub name: String,
    pub is_efi_system: bool,
}

impl EspLocation {
    pub fn window(&self) -> PartitionWindow {
        PartitionWindow {
            offset: self.first_lba * self.sector_size,
            size: (self.last_lba - self.first_lba + 1) * self.sector_size,
        }
    }
}

fn logical_block_size(sector_size: u64) -> Result<LogicalBlockSize> {
    match sector_size {
        512 => Ok(LogicalBlockSize::Lb512),
        4096 => Ok(LogicalBlockSize::Lb4096),
        other => bail!("Unsupported logical sector size: {}", other),
    }
}

/// GPT header signature, found at LBA 1
const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

/// Sector sizes a GPT may have been written with
pub const SUPPORTED_SECTOR_SIZES: [u64; 2] = [512, 4096];

/// Find the logical sector size a GPT was written with by looking for its
/// header at LBA 1 for each supported size.
pub fn detect_sector_size<D: BlockDevice + ?Sized>(device: &D) -> Result<Option<u64>> {
    let mut handle = device.open(OpenMode::ReadOnly)?;
    for sector_size in SUPPORTED_SECTOR_SIZES {
        let mut signature = [0u8; 8];
        handle.seek(SeekFrom::Start(sector_size))?;
        if handle.read_exact(&mut signature).is_err() {
            continue;
        }
        if &signature == GPT_SIGNATURE {
            debug!(sector_size, "Found GPT header at LBA 1");
            return Ok(Some(sector_size));
        }
    }
    Ok(None)
}

/// Write a protective MBR and a fresh GPT holding the planned ESP
pub fn write_partition_table<D: BlockDevice + ?Sized>(device: &D, plan: &PartitionPlan) -> Result<()> {
    info!(
        "Writing GPT to {}: ESP sectors {}..={} of {}",
        device.describe(),
        plan.start,
        plan.end,
        plan.total_sectors
    );

    let mut handle = device.open(OpenMode::ReadWrite)?;

    if plan.protective_mbr {
        // The protective MBR covers the whole disk, saturating at the 32-bit LBA limit
        let lb_size = u32::try_from(plan.total_sectors - 1).unwrap_or(u32::MAX);
        ProtectiveMBR::with_lb_size(lb_size)
            .overwrite_lba0(&mut handle)
            .context("Failed to write protective MBR")?;
    }

    let mut gpt_disk = GptConfig::new()
        .writable(true)
        .initialized(false)
        .logical_block_size(logical_block_size(plan.sector_size)?)
        .create_from_device(Box::new(handle), None)
        .context("Failed to create GPT")?;

    let esp = Partition {
        part_type_guid: partition_types::EFI,
        part_guid: Uuid::new_v4(),
        first_lba: plan.start,
        last_lba: plan.end,
        flags: 0,
        name: ESP_PARTITION_NAME.to_string(),
    };
    let partitions = BTreeMap::from([(ESP_PARTITION_ID, esp)]);

    gpt_disk
        .update_partitions(partitions)
        .context("Failed to add EFI System Partition")?;

    let mut handle = gpt_disk.write().context("Failed to write GPT")?;
    handle.flush().context("Failed to flush GPT")?;
    drop(handle);

    device.sync().context("Failed to sync partition table")?;
    Ok(())
}

/// Re-read the partition table and return its first used partition
pub fn read_esp_location<D: BlockDevice + ?Sized>(device: &D) -> Result<EspLocation> {
    let sector_size = device.logical_sector_size();
    let handle = device.open(OpenMode::ReadOnly)?;

    let gpt_disk = GptConfig::new()
        .writable(false)
        .logical_block_size(logical_block_size(sector_size)?)
        .open_from_device(Box::new(handle))
        .context("Failed to parse GPT partition table")?;

    let (id, part) = gpt_disk
        .partitions()
        .iter()
        .find(|(_, part)| part.is_used())
        .ok_or_else(|| anyhow!("GPT partition table has no partitions"))?;

    debug!(
        id = *id,
        name = %part.name,
        first_lba = part.first_lba,
        last_lba = part.last_lba,
        "Found first partition"
    );

    Ok(EspLocation {
        first_lba: part.first_lba,
        last_lba: part.last_lba,
        sector_size,
        name: part.name.clone(),
        is_efi_system: part.part_type_guid == partition_types::EFI,
    })
}

/// Confirm the on-disk table matches the plan
pub fn confirm_partition_table<D: BlockDevice + ?Sized>(device: &D, plan: &PartitionPlan) -> Result<()> {
    let found = read_esp_location(device).context("Failed to re-read partition table")?;

    if found.first_lba != plan.start || found.last_lba != plan.end {
        bail!(
            "Partition table mismatch: expected sectors {}..={}, found {}..={}",
            plan.start,
            plan.end,
            found.first_lba,
            found.last_lba
        );
    }
    if !found.is_efi_system {
        bail!("Partition table mismatch: first partition is not an EFI System Partition");
    }

    info!("GPT verified on {}", device.describe());
    Ok(())
}
