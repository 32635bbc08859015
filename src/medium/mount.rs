// Read-only mounting of the installation medium

use anyhow::{Context, Result};
use nix::mount::{MsFlags, mount};
use std::path::Path;
use tracing::debug;

use crate::models::MediumFsType;

/// Mounts a device read-only with an explicit filesystem type
pub trait Mounter {
    fn mount_readonly(&mut self, device: &Path, target: &Path, fs_type: MediumFsType) -> Result<()>;
}

impl<M: Mounter + ?Sized> Mounter for &mut M {
    fn mount_readonly(&mut self, device: &Path, target: &Path, fs_type: MediumFsType) -> Result<()> {
        (**self).mount_readonly(device, target, fs_type)
    }
}

/// Mounts through the kernel's mount(2)
#[derive(Debug, Default, Clone, Copy)]
pub struct NixMounter;

impl Mounter for NixMounter {
    fn mount_readonly(&mut self, device: &Path, target: &Path, fs_type: MediumFsType) -> Result<()> {
        mount(
            Some(device),
            target,
            Some(fs_type.as_str()),
            MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .with_context(|| {
            format!(
                "mount {} on {} as {}",
                device.display(),
                target.display(),
                fs_type
            )
        })?;

        debug!(device = %device.display(), target = %target.display(), %fs_type, "Mounted read-only");
        Ok(())
    }
}
