// Candidate-device strategies for finding the installation medium
//
// Each strategy only inspects system state and proposes device nodes; the
// locator does all mounting. Strategies are tried in `DEFAULT_STRATEGIES` order.

use std::path::PathBuf;

use crate::context::ExecContext;
use crate::disk::LinuxDiskAccess;

/// Conventional virtio device a hypervisor attaches boot media as
pub const VIRTIO_BOOT_DEVICE: &str = "vda";

#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub candidates: fn(&ExecContext) -> Vec<PathBuf>,
}

pub const DEFAULT_STRATEGIES: [Strategy; 3] = [
    Strategy {
        name: "virtio boot device",
        candidates: virtio_boot_device,
    },
    Strategy {
        name: "first read-only block device",
        candidates: first_read_only_block,
    },
    Strategy {
        name: "legacy optical devices",
        candidates: legacy_optical_devices,
    },
];

/// The virtio boot device, if the kernel flags it read-only
pub fn virtio_boot_device(ctx: &ExecContext) -> Vec<PathBuf> {
    match LinuxDiskAccess::read_only_flag(ctx, VIRTIO_BOOT_DEVICE) {
        Some(true) => vec![ctx.dev_node(VIRTIO_BOOT_DEVICE)],
        _ => Vec::new(),
    }
}

/// The first block device, by name, that is read-only and has a device node
pub fn first_read_only_block(ctx: &ExecContext) -> Vec<PathBuf> {
    LinuxDiskAccess::block_device_names(ctx)
        .into_iter()
        .filter(|name| LinuxDiskAccess::read_only_flag(ctx, name) == Some(true))
        .map(|name| ctx.dev_node(&name))
        .find(|node| node.exists())
        .into_iter()
        .collect()
}

/// Fixed optical device paths that exist
pub fn legacy_optical_devices(ctx: &ExecContext) -> Vec<PathBuf> {
    ctx.legacy_devices
        .iter()
        .filter(|path| path.exists())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstallerSettings;
    use std::fs;
    use tempfile::TempDir;

    fn context(root: &TempDir) -> ExecContext {
        let mut ctx = InstallerSettings::default().exec_context();
        ctx.sys_block_dir = root.path().join("sys/block");
        ctx.dev_dir = root.path().join("dev");
        ctx.legacy_devices = vec![root.path().join("dev/sr0"), root.path().join("dev/cdrom")];
        fs::create_dir_all(&ctx.sys_block_dir).unwrap();
        fs::create_dir_all(&ctx.dev_dir).unwrap();
        ctx
    }

    fn block(ctx: &ExecContext, name: &str, ro: &str, with_node: bool) {
        fs::create_dir_all(ctx.block_dir(name)).unwrap();
        fs::write(ctx.block_dir(name).join("ro"), ro).unwrap();
        if with_node {
            fs::write(ctx.dev_node(name), b"").unwrap();
        }
    }

    #[test]
    fn test_virtio_requires_read_only_flag() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root);
        assert!(virtio_boot_device(&ctx).is_empty());

        block(&ctx, "vda", "0\n", true);
        assert!(virtio_boot_device(&ctx).is_empty());

        block(&ctx, "vda", "1\n", false);
        assert_eq!(virtio_boot_device(&ctx), vec![ctx.dev_node("vda")]);
    }

    #[test]
    fn test_first_read_only_block_needs_device_node() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root);
        block(&ctx, "sda", "0\n", true);
        block(&ctx, "sdb", "1\n", false);
        block(&ctx, "sr0", "1\n", true);
        block(&ctx, "sr1", "1\n", true);

        assert_eq!(first_read_only_block(&ctx), vec![ctx.dev_node("sr0")]);
    }

    #[test]
    fn test_legacy_devices_must_exist() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root);
        assert!(legacy_optical_devices(&ctx).is_empty());

        fs::write(root.path().join("dev/cdrom"), b"").unwrap();
        assert_eq!(
            legacy_optical_devices(&ctx),
            vec![root.path().join("dev/cdrom")]
        );
    }
}
