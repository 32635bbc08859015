//! Boot medium discovery.
//!
//! The locator walks an ordered list of candidate strategies and, for every
//! proposed device, tries each filesystem type in `MediumFsType::FALLBACK_ORDER`.
//! The first successful read-only mount wins and nothing after it is attempted.

use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::context::ExecContext;
use crate::disk::LinuxDiskAccess;
use crate::error::InstallError;
use crate::models::{BootMedium, MediumFsType};

pub mod modules;
pub mod mount;
pub mod strategy;

pub use mount::{Mounter, NixMounter};
pub use strategy::{DEFAULT_STRATEGIES, Strategy};

pub struct MediumLocator<'a, M: Mounter> {
    ctx: &'a ExecContext,
    mounter: M,
    strategies: Vec<Strategy>,
    load_modules: bool,
}

impl<'a, M: Mounter> MediumLocator<'a, M> {
    pub fn new(ctx: &'a ExecContext, mounter: M) -> Self {
        Self {
            ctx,
            mounter,
            strategies: DEFAULT_STRATEGIES.to_vec(),
            load_modules: true,
        }
    }

    /// Replace the candidate strategies
    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Skip kernel module loading
    pub fn without_module_loading(mut self) -> Self {
        self.load_modules = false;
        self
    }

    pub fn into_mounter(self) -> M {
        self.mounter
    }

    /// Find the installation medium and mount it read-only at the context's mount point
    pub fn locate_and_mount(&mut self) -> Result<BootMedium, InstallError> {
        if self.load_modules {
            modules::load_storage_modules(self.ctx);
        }

        if let Err(e) = std::fs::create_dir_all(&self.ctx.mount_point) {
            warn!("Cannot create {}: {}", self.ctx.mount_point.display(), e);
        }
        LinuxDiskAccess::log_block_devices(self.ctx);

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut failures: Vec<String> = Vec::new();

        // Copied so the loop holds no borrow of `self` while mounting
        let strategies = self.strategies.clone();
        for strategy in &strategies {
            let candidates = (strategy.candidates)(self.ctx);
            debug!(strategy = strategy.name, ?candidates, "Medium candidates");

            for device in candidates {
                if !seen.insert(device.clone()) {
                    continue;
                }

                match self.try_mount(&device) {
                    Ok(fs_type) => {
                        info!(
                            "Mounted installation medium {} ({}) at {}",
                            device.display(),
                            fs_type,
                            self.ctx.mount_point.display()
                        );
                        return Ok(BootMedium {
                            device,
                            fs_type,
                            mount_point: self.ctx.mount_point.clone(),
                        });
                    }
                    Err(reasons) => failures.extend(reasons),
                }
            }
        }

        if seen.is_empty() {
            return Err(InstallError::MediumNotFound(
                "no candidate devices".to_string(),
            ));
        }
        Err(InstallError::MediumNotFound(failures.join("; ")))
    }

    /// Try each filesystem type on one device; returns the failure messages when none mounts
    fn try_mount(&mut self, device: &std::path::Path) -> Result<MediumFsType, Vec<String>> {
        let mut reasons = Vec::new();
        for fs_type in MediumFsType::FALLBACK_ORDER {
            match self
                .mounter
                .mount_readonly(device, &self.ctx.mount_point, fs_type)
            {
                Ok(()) => return Ok(fs_type),
                Err(e) => {
                    debug!("mount {} on {} failed: {:#}", fs_type, device.display(), e);
                    reasons.push(format!("{:#}", e));
                }
            }
        }
        Err(reasons)
    }
}
