// Best-effort loading of the storage stack needed to see optical media

use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info, warn};

use crate::context::ExecContext;

/// Kernel modules loaded before looking for the medium, relative to
/// `<modules_dir>/<release>/kernel`, in load order
pub const STORAGE_MODULES: [&str; 7] = [
    "drivers/scsi/scsi_mod.ko",
    "drivers/scsi/sd_mod.ko",
    "drivers/scsi/virtio_scsi.ko",
    "drivers/ata/ata_piix.ko",
    "drivers/cdrom/cdrom.ko",
    "drivers/scsi/sr_mod.ko",
    "fs/isofs/isofs.ko",
];

/// Running kernel release, `None` when unreadable or empty
pub fn kernel_release(ctx: &ExecContext) -> Option<String> {
    std::fs::read_to_string(&ctx.kernel_release_file)
        .ok()
        .map(|release| release.trim().to_string())
        .filter(|release| !release.is_empty())
}

/// Module files for the given kernel release that exist on this system
pub fn module_paths(ctx: &ExecContext, release: &str) -> Vec<PathBuf> {
    let kernel_dir = ctx.modules_dir.join(release).join("kernel");
    STORAGE_MODULES
        .iter()
        .map(|module| kernel_dir.join(module))
        .filter(|path| path.exists())
        .collect()
}

/// Insert every available storage module, then wait for device nodes to settle.
///
/// Nothing here is fatal: a module that is missing, built in or fails to load
/// is logged and skipped. Returns the number of modules inserted.
pub fn load_storage_modules(ctx: &ExecContext) -> usize {
    let Some(release) = kernel_release(ctx) else {
        warn!(
            "Kernel release unreadable from {}, skipping module loading",
            ctx.kernel_release_file.display()
        );
        return 0;
    };

    let mut loaded = 0;
    for module in module_paths(ctx, &release) {
        let status = ctx.command("insmod").and_then(|mut cmd| {
            cmd.arg(&module)
                .stdin(Stdio::null())
                .status()
                .map_err(anyhow::Error::from)
        });

        match status {
            Ok(status) if status.success() => {
                debug!(module = %module.display(), "Loaded kernel module");
                loaded += 1;
            }
            Ok(status) => debug!(module = %module.display(), %status, "insmod failed"),
            Err(e) => warn!("Cannot load {}: {:#}", module.display(), e),
        }
    }

    info!("Loaded {} storage module(s) for kernel {}", loaded, release);
    std::thread::sleep(ctx.settle_delay);
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstallerSettings;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context(root: &TempDir) -> ExecContext {
        let mut ctx = InstallerSettings::default().exec_context();
        ctx.kernel_release_file = root.path().join("osrelease");
        ctx.modules_dir = root.path().join("lib/modules");
        ctx.settle_delay = Duration::ZERO;
        ctx
    }

    #[test]
    fn test_module_paths_only_lists_existing_files() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root);
        let kernel_dir = ctx.modules_dir.join("6.6.0-goos/kernel");
        for module in ["drivers/cdrom/cdrom.ko", "fs/isofs/isofs.ko"] {
            let path = kernel_dir.join(module);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }

        let paths = module_paths(&ctx, "6.6.0-goos");
        assert_eq!(
            paths,
            vec![
                kernel_dir.join("drivers/cdrom/cdrom.ko"),
                kernel_dir.join("fs/isofs/isofs.ko"),
            ]
        );
    }

    #[test]
    fn test_kernel_release_is_trimmed() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root);
        assert_eq!(kernel_release(&ctx), None);

        fs::write(&ctx.kernel_release_file, "6.6.0-goos\n").unwrap();
        assert_eq!(kernel_release(&ctx).as_deref(), Some("6.6.0-goos"));
    }

    #[test]
    fn test_failed_insmod_is_not_fatal() {
        let root = TempDir::new().unwrap();
        let mut ctx = context(&root);
        fs::write(&ctx.kernel_release_file, "6.6.0-goos\n").unwrap();
        let module = ctx.modules_dir.join("6.6.0-goos/kernel/fs/isofs/isofs.ko");
        fs::create_dir_all(module.parent().unwrap()).unwrap();
        fs::write(&module, b"").unwrap();

        ctx.tools
            .insert("insmod".to_string(), root.path().join("missing-insmod"));
        assert_eq!(load_storage_modules(&ctx), 0);
    }

    #[test]
    fn test_unreadable_release_skips_loading() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root);
        assert_eq!(load_storage_modules(&ctx), 0);
    }
}
