//! Filesystem Stager: formats the ESP and writes the boot files and config onto it.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::disk::configuration::ProvisioningConfig;
use crate::disk::{BlockDevice, FormatSpec, OpenMode, PartitionPlan};
use crate::error::InstallError;
use crate::models::BootMedium;

pub const BOOT_LOADER_PATH: &str = "/EFI/BOOT/BOOTX64.EFI";
pub const KERNEL_PATH: &str = "/vmlinuz";
pub const INITRD_PATH: &str = "/initramfs.cpio";
pub const LOADER_CONF_PATH: &str = "/loader/loader.conf";
pub const ENTRY_CONF_PATH: &str = "/loader/entries/goos.conf";

/// Payload locations on the installation medium
pub const MEDIUM_KERNEL: &str = "boot/vmlinuz";
pub const MEDIUM_INITRD: &str = "boot/initramfs.cpio";

pub const KERNEL_OPTIONS: &str = "console=ttyS0 goos.shell=1";

pub const PROGRESS_BOOT_FILES: &str = "Writing boot files…";
pub const PROGRESS_CONFIG: &str = "Writing configuration…";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOptions {
    /// Boot loader binary, read from the running system rather than the medium
    pub loader_efi: PathBuf,
    pub volume_label: String,
    pub config_file_name: String,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            loader_efi: PathBuf::from("/systemd-bootx64.efi"),
            volume_label: "EFI".to_string(),
            config_file_name: "goos-installer.conf".to_string(),
        }
    }
}

/// One file written onto the ESP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub esp_path: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Every file written, in write order
    pub artifacts: Vec<StagedArtifact>,
    /// Where the configuration landed
    pub config_path: String,
}

impl StageReport {
    pub fn paths(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.esp_path.as_str()).collect()
    }
}

/// systemd-boot loader configuration: default entry, no menu, no editor
pub fn loader_conf() -> String {
    "default goos\ntimeout 0\neditor no\n".to_string()
}

/// The single boot entry
pub fn entry_conf() -> String {
    format!(
        "title GOOS\nlinux {}\ninitrd {}\noptions {}\n",
        KERNEL_PATH, INITRD_PATH, KERNEL_OPTIONS
    )
}

pub struct FilesystemStager<'a, D: BlockDevice> {
    device: &'a D,
    options: &'a StageOptions,
}

impl<'a, D: BlockDevice> FilesystemStager<'a, D> {
    pub fn new(device: &'a D, options: &'a StageOptions) -> Self {
        Self { device, options }
    }

    /// Format the ESP, then write the boot files and the configuration.
    ///
    /// A format failure is a `FormatError`; anything after it is a `StageError`
    /// and leaves the freshly formatted ESP behind.
    pub fn stage(
        &self,
        plan: &PartitionPlan,
        medium: &BootMedium,
        config: &ProvisioningConfig,
    ) -> Result<StageReport, InstallError> {
        self.stage_with_progress(plan, medium, config, |_| {})
    }

    /// `stage`, announcing the boot file and configuration phases as each begins
    pub fn stage_with_progress<F: FnMut(&str)>(
        &self,
        plan: &PartitionPlan,
        medium: &BootMedium,
        config: &ProvisioningConfig,
        mut progress: F,
    ) -> Result<StageReport, InstallError> {
        progress(PROGRESS_BOOT_FILES);
        let spec = FormatSpec {
            volume_label: self.options.volume_label.clone(),
        };
        self.device
            .format(plan, &spec)
            .map_err(InstallError::format)?;

        self.write_files(plan, medium, config, &mut progress)
            .map_err(InstallError::stage)
    }

    fn write_files(
        &self,
        plan: &PartitionPlan,
        medium: &BootMedium,
        config: &ProvisioningConfig,
        progress: &mut dyn FnMut(&str),
    ) -> Result<StageReport> {
        // All sources are read before the ESP is touched
        let loader = read_source(&self.options.loader_efi)?;
        let kernel = read_source(&medium.path(MEDIUM_KERNEL))?;
        let initrd = read_source(&medium.path(MEDIUM_INITRD))?;

        let fs = self.device.open_filesystem(plan.window(), OpenMode::ReadWrite)?;
        let mut report = StageReport::default();

        create_dir_all(&fs, "/EFI/BOOT")?;
        report.artifacts.push(write_file(&fs, BOOT_LOADER_PATH, &loader)?);
        report.artifacts.push(write_file(&fs, KERNEL_PATH, &kernel)?);
        report.artifacts.push(write_file(&fs, INITRD_PATH, &initrd)?);

        create_dir_all(&fs, "/loader/entries")?;
        report
            .artifacts
            .push(write_file(&fs, LOADER_CONF_PATH, loader_conf().as_bytes())?);
        report
            .artifacts
            .push(write_file(&fs, ENTRY_CONF_PATH, entry_conf().as_bytes())?);

        progress(PROGRESS_CONFIG);
        let config_path = match create_dir_all(&fs, "/etc") {
            Ok(()) => format!("/etc/{}", self.options.config_file_name),
            Err(e) => {
                debug!("No /etc on ESP ({:#}), writing config to the root", e);
                format!("/{}", self.options.config_file_name)
            }
        };
        report
            .artifacts
            .push(write_file(&fs, &config_path, &config.serialize())?);
        report.config_path = config_path;

        fs.unmount().context("Failed to flush ESP filesystem")?;
        self.device.sync()?;

        info!("Staged {} files onto the ESP", report.artifacts.len());
        Ok(report)
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    std::fs::read(path).with_context(|| format!("read {} ({})", name, path.display()))
}

/// Create a directory and its parents on the FAT filesystem; existing ones are reused
pub fn create_dir_all<T: fatfs::ReadWriteSeek>(fs: &fatfs::FileSystem<T>, path: &str) -> Result<()> {
    let mut dir = fs.root_dir();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        dir = dir
            .create_dir(component)
            .with_context(|| format!("create directory {}", path))?;
    }
    Ok(())
}

/// Write (or overwrite) one file and record its size and digest
pub fn write_file<T: fatfs::ReadWriteSeek>(
    fs: &fatfs::FileSystem<T>,
    path: &str,
    data: &[u8],
) -> Result<StagedArtifact> {
    let mut file = fs
        .root_dir()
        .create_file(path.trim_start_matches('/'))
        .with_context(|| format!("create {}", path))?;
    file.truncate().with_context(|| format!("truncate {}", path))?;
    file.write_all(data)
        .with_context(|| format!("write {}", path))?;
    file.flush().with_context(|| format!("flush {}", path))?;

    let artifact = StagedArtifact {
        esp_path: path.to_string(),
        size: data.len() as u64,
        sha256: hex::encode(Sha256::digest(data)),
    };
    info!(
        path = %artifact.esp_path,
        size = artifact.size,
        sha256 = %artifact.sha256,
        "Wrote file to ESP"
    );
    Ok(artifact)
}
