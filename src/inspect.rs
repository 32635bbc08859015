// Read-only inspection of a provisioned disk, used by the config reader

use anyhow::{Context, Result, bail};
use std::io::Read;
use tracing::debug;

use crate::disk::configuration::{ProvisioningConfig, parse_config};
use crate::disk::partition::read_esp_location;
use crate::disk::{BlockDevice, EspFilesystem, OpenMode};

/// One file or directory on the ESP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EspEntry {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

fn open_esp<D: BlockDevice + ?Sized>(device: &D) -> Result<EspFilesystem<D::Handle>> {
    let location = read_esp_location(device)?;
    debug!(
        first_lba = location.first_lba,
        last_lba = location.last_lba,
        "Opening ESP read-only"
    );
    device.open_filesystem(location.window(), OpenMode::ReadOnly)
}

/// Every path on the ESP, depth first, sorted by name within each directory
pub fn list_esp<D: BlockDevice + ?Sized>(device: &D) -> Result<Vec<EspEntry>> {
    let fs = open_esp(device)?;
    let mut entries = Vec::new();
    walk(&fs.root_dir(), "", &mut entries)?;
    Ok(entries)
}

fn walk<T: fatfs::ReadWriteSeek>(dir: &fatfs::Dir<'_, T>, prefix: &str, out: &mut Vec<EspEntry>) -> Result<()> {
    let mut children = Vec::new();
    for entry in dir.iter() {
        let entry = entry.with_context(|| format!("read directory {}/", prefix))?;
        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }
        children.push(entry);
    }
    children.sort_by_key(|entry| entry.file_name());

    for entry in children {
        let path = format!("{}/{}", prefix, entry.file_name());
        out.push(EspEntry {
            path: path.clone(),
            size: if entry.is_dir() { 0 } else { entry.len() },
            is_dir: entry.is_dir(),
        });
        if entry.is_dir() {
            walk(&entry.to_dir(), &path, out)?;
        }
    }
    Ok(())
}

/// Find and parse the persisted configuration; returns the path it was read from
pub fn read_persisted_config<D: BlockDevice + ?Sized>(
    device: &D,
    file_name: &str,
) -> Result<(String, ProvisioningConfig)> {
    let fs = open_esp(device)?;
    let root = fs.root_dir();

    for path in [format!("/etc/{}", file_name), format!("/{}", file_name)] {
        let Ok(mut file) = root.open_file(path.trim_start_matches('/')) else {
            continue;
        };
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("read {}", path))?;
        return Ok((path, parse_config(&content)));
    }

    bail!("{} not found in /etc or at the ESP root", file_name)
}
