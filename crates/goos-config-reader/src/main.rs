use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use goos_installer::disk::partition::SUPPORTED_SECTOR_SIZES;
use goos_installer::disk::{BlockDevice, DeviceFile};
use goos_installer::disk::configuration::ProvisioningConfig;
use goos_installer::inspect::{list_esp, read_persisted_config};

const MASK: &str = "********";

/// Read the GOOS installer configuration back from a provisioned disk
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the disk device or image (e.g. "/dev/vda" or "disk.img")
    #[clap(short, long)]
    disk: PathBuf,

    /// Name of the configuration file on the ESP
    #[clap(long, default_value = "goos-installer.conf")]
    config_name: String,

    /// Print the configuration as JSON
    #[clap(long)]
    json: bool,

    /// List every file on the ESP with its size
    #[clap(short, long)]
    list: bool,

    /// Print the root password instead of masking it
    #[clap(long)]
    show_secrets: bool,

    /// Logical sector size of the disk; detected from the GPT header when omitted
    #[clap(long, value_parser = parse_sector_size)]
    sector_size: Option<u64>,
}

fn parse_sector_size(value: &str) -> Result<u64, String> {
    let size: u64 = value.parse().map_err(|e| format!("{}", e))?;
    if SUPPORTED_SECTOR_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(format!("expected one of {:?}", SUPPORTED_SECTOR_SIZES))
    }
}

fn open_disk(path: &Path, sector_size: Option<u64>) -> Result<DeviceFile> {
    match sector_size {
        Some(size) => Ok(DeviceFile::with_sector_size(path, size)),
        None => DeviceFile::detect(path)
            .with_context(|| format!("Failed to open {}", path.display())),
    }
}

fn masked(mut config: ProvisioningConfig, show_secrets: bool) -> ProvisioningConfig {
    if !show_secrets && !config.root_password.is_empty() {
        config.root_password = MASK.to_string();
    }
    config
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Reading GOOS configuration from {}", args.disk.display());
    let device = open_disk(&args.disk, args.sector_size)?;
    debug!("Using {}-byte sectors", device.logical_sector_size());

    if args.list {
        let entries = list_esp(&device)
            .with_context(|| format!("Failed to list ESP on {}", args.disk.display()))?;
        for entry in entries {
            if entry.is_dir {
                println!("{:>12}  {}/", "<dir>", entry.path);
            } else {
                println!("{:>12}  {}", entry.size, entry.path);
            }
        }
        println!();
    }

    let (path, config) = read_persisted_config(&device, &args.config_name)
        .with_context(|| format!("Failed to read configuration from {}", args.disk.display()))?;
    let config = masked(config, args.show_secrets);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("GOOS configuration ({})", path);
    println!("==================");
    print!("{}", config.to_config_content());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_masked_unless_requested() {
        let config = ProvisioningConfig {
            root_password: "s3cret".to_string(),
            ..ProvisioningConfig::default()
        };
        assert_eq!(masked(config.clone(), false).root_password, MASK);
        assert_eq!(masked(config, true).root_password, "s3cret");
        assert_eq!(masked(ProvisioningConfig::default(), false).root_password, "");
    }

    #[test]
    fn test_sector_size_argument() {
        assert_eq!(parse_sector_size("4096"), Ok(4096));
        assert_eq!(parse_sector_size("512"), Ok(512));
        assert!(parse_sector_size("1024").is_err());
        assert!(parse_sector_size("big").is_err());

        let args = Args::parse_from(["goos-config-reader", "--disk", "disk.img", "--sector-size", "4096"]);
        assert_eq!(args.sector_size, Some(4096));
        assert_eq!(open_disk(&args.disk, args.sector_size).unwrap().logical_sector_size(), 4096);
    }
}
