// Linux-specific disk operations: sysfs inventory and durability helpers

use crate::context::ExecContext;
use crate::disk::common::{DEFAULT_SECTOR_SIZE, DiskDevice};
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use tracing::{debug, info, warn};

/// Device name prefixes that are never installation targets:
/// loopback, RAM disks, optical drives and floppies
const SKIPPED_PREFIXES: [&str; 4] = ["loop", "ram", "sr", "fd"];

/// The kernel reports block device sizes in 512-byte units regardless of the sector size
const SYSFS_SIZE_UNIT: u64 = 512;

/// Linux-specific disk access functionality
#[derive(Debug, Clone, Copy)]
pub struct LinuxDiskAccess;

impl LinuxDiskAccess {
    /// Lists candidate target disks.
    ///
    /// Never returns an empty list: when nothing qualifies a placeholder entry
    /// is returned instead so the caller always has something to offer.
    pub fn list_available_disks(ctx: &ExecContext) -> Vec<DiskDevice> {
        let mut disks: Vec<DiskDevice> = Self::block_device_names(ctx)
            .into_iter()
            .filter(|name| !Self::skip_disk(name))
            .map(|name| Self::describe_disk(ctx, &name))
            .collect();

        if disks.is_empty() {
            warn!(
                "No candidate disks under {}, offering placeholder",
                ctx.sys_block_dir.display()
            );
            disks.push(DiskDevice::placeholder());
        }

        info!("Detected {} candidate disk(s)", disks.len());
        disks
    }

    /// All entries of the block device listing, sorted by name
    pub fn block_device_names(ctx: &ExecContext) -> Vec<String> {
        let entries = match std::fs::read_dir(&ctx.sys_block_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read {}: {}", ctx.sys_block_dir.display(), e);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn skip_disk(name: &str) -> bool {
        SKIPPED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
    }

    /// Build a snapshot of one block device; missing metadata is tolerated
    pub fn describe_disk(ctx: &ExecContext, name: &str) -> DiskDevice {
        let size_bytes = Self::read_attribute(ctx, name, "size")
            .and_then(|value| value.parse::<u64>().ok())
            .map(|sectors| sectors * SYSFS_SIZE_UNIT);

        let disk = DiskDevice {
            name: name.to_string(),
            path: ctx.dev_node(name),
            size_bytes,
            logical_sector_size: Self::read_sector_size(ctx, name, "queue/logical_block_size"),
            physical_sector_size: Self::read_sector_size(ctx, name, "queue/physical_block_size"),
            model: Self::read_model(ctx, name),
        };

        debug!(
            name = %disk.name,
            size = %disk.display_size(),
            model = %disk.model,
            "Found disk"
        );
        disk
    }

    fn read_model(ctx: &ExecContext, name: &str) -> String {
        Self::read_attribute(ctx, name, "device/model")
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn read_sector_size(ctx: &ExecContext, name: &str, attribute: &str) -> u64 {
        Self::read_attribute(ctx, name, attribute)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SECTOR_SIZE)
    }

    /// Whether the kernel flags the device read-only; `None` when the flag is unreadable
    pub fn read_only_flag(ctx: &ExecContext, name: &str) -> Option<bool> {
        Self::read_attribute(ctx, name, "ro").map(|value| value == "1")
    }

    /// Read one trimmed sysfs attribute of a block device
    fn read_attribute(ctx: &ExecContext, name: &str, attribute: &str) -> Option<String> {
        std::fs::read_to_string(ctx.block_dir(name).join(attribute))
            .ok()
            .map(|value| value.trim().to_string())
    }

    /// Log the read-only flag and device node presence of every block device
    pub fn log_block_devices(ctx: &ExecContext) {
        for name in Self::block_device_names(ctx) {
            let ro = match Self::read_only_flag(ctx, &name) {
                Some(true) => "1",
                Some(false) => "0",
                None => "?",
            };
            let node = ctx.dev_node(&name);
            if node.exists() {
                debug!("block {} ro={} dev={}", name, ro, node.display());
            } else {
                debug!("block {} ro={} dev=missing", name, ro);
            }
        }
    }

    /// Flush a file's data and metadata to stable storage
    pub fn fsync(file: &File) -> io::Result<()> {
        let sync_start = std::time::Instant::now();
        let fd = file.as_raw_fd();
        let sync_result = unsafe { libc::fsync(fd) };
        if sync_result != 0 {
            return Err(io::Error::last_os_error());
        }
        debug!("fsync completed in {:?}", sync_start.elapsed());
        Ok(())
    }

    /// Ask the kernel to commit all filesystem buffers
    pub fn sync_filesystems() {
        unsafe { libc::sync() };
    }
}
