// Post-write check of the target disk

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::disk::partition::read_esp_location;
use crate::disk::{BlockDevice, DeviceFile, OpenMode};
use crate::error::InstallError;
use crate::stage::BOOT_LOADER_PATH;

/// Reopen the disk read-only and confirm the ESP holds a boot loader.
///
/// Only existence of the loader is checked; its contents are not read.
pub fn verify<D: BlockDevice + ?Sized>(device: &D) -> Result<(), InstallError> {
    check(device).map_err(InstallError::verify)?;
    info!("Verified ESP on {}", device.describe());
    Ok(())
}

/// Verify the disk at a device node or image path, whatever its sector size
pub fn verify_path(path: &Path) -> Result<(), InstallError> {
    let device = DeviceFile::detect(path).map_err(InstallError::verify)?;
    verify(&device)
}

fn check<D: BlockDevice + ?Sized>(device: &D) -> Result<()> {
    let location = read_esp_location(device).context("read partition table")?;
    let fs = device
        .open_filesystem(location.window(), OpenMode::ReadOnly)
        .context("read filesystem")?;

    let loader = fs
        .root_dir()
        .open_file(BOOT_LOADER_PATH.trim_start_matches('/'))
        .context("missing BOOTX64.EFI")?;
    drop(loader);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::PartitionPlan;
    use crate::disk::memory::MemoryDisk;
    use crate::stage::{create_dir_all, write_file};

    const MIB: usize = 1024 * 1024;

    fn formatted_disk() -> (MemoryDisk, PartitionPlan) {
        let disk = MemoryDisk::new(64 * MIB);
        let plan = PartitionPlan::for_geometry((64 * MIB / 512) as u64, 512).unwrap();
        disk.partition(&plan).unwrap();
        disk.format(
            &plan,
            &crate::disk::FormatSpec {
                volume_label: "EFI".to_string(),
            },
        )
        .unwrap();
        (disk, plan)
    }

    #[test]
    fn test_verify_finds_loader() {
        let (disk, plan) = formatted_disk();
        let fs = disk.open_filesystem(plan.window(), OpenMode::ReadWrite).unwrap();
        create_dir_all(&fs, "/EFI/BOOT").unwrap();
        write_file(&fs, BOOT_LOADER_PATH, b"MZ").unwrap();
        fs.unmount().unwrap();

        verify(&disk).unwrap();
    }

    #[test]
    fn test_verify_fails_without_loader() {
        let (disk, plan) = formatted_disk();
        let fs = disk.open_filesystem(plan.window(), OpenMode::ReadWrite).unwrap();
        write_file(&fs, "/vmlinuz", b"kernel").unwrap();
        fs.unmount().unwrap();

        let err = verify(&disk).unwrap_err();
        assert!(matches!(err, InstallError::VerifyError(_)));
        assert!(err.to_string().contains("BOOTX64.EFI"));
    }

    #[test]
    fn test_verify_fails_on_blank_disk() {
        let disk = MemoryDisk::new(8 * MIB);
        assert!(matches!(verify(&disk), Err(InstallError::VerifyError(_))));
    }

    #[test]
    fn test_verify_does_not_modify_disk() {
        let (disk, plan) = formatted_disk();
        let fs = disk.open_filesystem(plan.window(), OpenMode::ReadWrite).unwrap();
        create_dir_all(&fs, "/EFI/BOOT").unwrap();
        write_file(&fs, BOOT_LOADER_PATH, b"MZ").unwrap();
        fs.unmount().unwrap();

        let before = disk.snapshot().unwrap();
        verify(&disk).unwrap();
        assert_eq!(disk.snapshot().unwrap(), before);
    }
}
