/// Installer settings loaded from an optional TOML file
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::context::ExecContext;
use crate::detached::DetachedSpec;
use crate::stage::StageOptions;

pub const DEFAULT_SEARCH_PATH: &str = "/bbin:/bin:/usr/bin:/sbin:/usr/sbin";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    pub sys_block_dir: PathBuf,
    pub dev_dir: PathBuf,
    pub kernel_release_file: PathBuf,
    pub modules_dir: PathBuf,
    pub mount_point: PathBuf,
    pub search_path: String,
    pub loader_efi: PathBuf,
    pub config_file_name: String,
    pub volume_label: String,
    pub settle_delay_ms: u64,
    pub legacy_devices: Vec<PathBuf>,

    /// Directory for a persistent log file; console only when unset
    pub log_dir: Option<PathBuf>,

    /// Background programs started before the pipeline and never awaited
    pub detached: Vec<DetachedSpec>,

    /// Explicit tool locations, e.g. `insmod = "/sbin/insmod"`
    pub tools: HashMap<String, PathBuf>,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            sys_block_dir: PathBuf::from("/sys/block"),
            dev_dir: PathBuf::from("/dev"),
            kernel_release_file: PathBuf::from("/proc/sys/kernel/osrelease"),
            modules_dir: PathBuf::from("/lib/modules"),
            mount_point: PathBuf::from("/mnt/iso"),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            loader_efi: PathBuf::from("/systemd-bootx64.efi"),
            config_file_name: "goos-installer.conf".to_string(),
            volume_label: "EFI".to_string(),
            settle_delay_ms: 200,
            legacy_devices: ["/dev/sr0", "/dev/sr1", "/dev/cdrom", "/dev/dvd", "/dev/hdc"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            log_dir: None,
            detached: Vec::new(),
            tools: HashMap::new(),
        }
    }
}

impl InstallerSettings {
    /// Load settings from a TOML file, or use the built-in defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings = Self::from_toml_content(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        info!("Loaded installer settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml_content(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))
    }

    /// Resolve the settings into the execution context shared by all components
    pub fn exec_context(&self) -> ExecContext {
        ExecContext {
            sys_block_dir: self.sys_block_dir.clone(),
            dev_dir: self.dev_dir.clone(),
            kernel_release_file: self.kernel_release_file.clone(),
            modules_dir: self.modules_dir.clone(),
            mount_point: self.mount_point.clone(),
            search_path: OsString::from(&self.search_path),
            tools: self.tools.clone(),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            legacy_devices: self.legacy_devices.clone(),
        }
    }

    pub fn stage_options(&self) -> StageOptions {
        StageOptions {
            loader_efi: self.loader_efi.clone(),
            volume_label: self.volume_label.clone(),
            config_file_name: self.config_file_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = InstallerSettings::default();
        assert_eq!(settings.mount_point, PathBuf::from("/mnt/iso"));
        assert_eq!(settings.config_file_name, "goos-installer.conf");
        assert_eq!(settings.legacy_devices.len(), 5);
        assert_eq!(settings.legacy_devices[0], PathBuf::from("/dev/sr0"));
        assert!(settings.detached.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let content = r#"
mount_point = "/run/medium"
settle_delay_ms = 0

[tools]
insmod = "/sbin/insmod"

[[detached]]
name = "guest-agent"
program = "qemu-ga"
args = ["--daemonize"]
"#;

        let settings = InstallerSettings::from_toml_content(content).unwrap();
        assert_eq!(settings.mount_point, PathBuf::from("/run/medium"));
        assert_eq!(settings.settle_delay_ms, 0);
        assert_eq!(settings.sys_block_dir, PathBuf::from("/sys/block"));
        assert_eq!(settings.tools["insmod"], PathBuf::from("/sbin/insmod"));
        assert_eq!(settings.detached.len(), 1);
        assert_eq!(settings.detached[0].program, "qemu-ga");
        assert_eq!(settings.detached[0].args, vec!["--daemonize"]);

        let ctx = settings.exec_context();
        assert_eq!(ctx.settle_delay, Duration::ZERO);
        assert_eq!(ctx.search_path, OsString::from(DEFAULT_SEARCH_PATH));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(InstallerSettings::from_toml_content("mount_point = [[[").is_err());
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        let settings = InstallerSettings::load(None).unwrap();
        assert_eq!(settings.volume_label, "EFI");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("installer.toml");
        std::fs::write(&path, "volume_label = \"GOOSESP\"\n").unwrap();

        let settings = InstallerSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.stage_options().volume_label, "GOOSESP");
    }
}
