//! Explicit execution context handed to every pipeline component.
//!
//! Nothing in the pipeline reads or mutates process-global state (working
//! directory, `PATH`); filesystem roots and tool locations all come from here,
//! which lets tests point the pipeline at a fake sysfs and device tree.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Kernel block device listing (normally "/sys/block")
    pub sys_block_dir: PathBuf,
    /// Device node directory (normally "/dev")
    pub dev_dir: PathBuf,
    /// File holding the running kernel's release string
    pub kernel_release_file: PathBuf,
    /// Root of the kernel module tree (normally "/lib/modules")
    pub modules_dir: PathBuf,
    /// Where the installation medium gets mounted
    pub mount_point: PathBuf,
    /// Search path used for tool lookup, in `PATH` syntax
    pub search_path: OsString,
    /// Explicit tool locations that bypass the search path
    pub tools: HashMap<String, PathBuf>,
    /// Pause after loading storage modules so device nodes can appear
    pub settle_delay: Duration,
    /// Optical device nodes tried last when looking for the medium
    pub legacy_devices: Vec<PathBuf>,
}

impl ExecContext {
    /// Directory describing one block device (e.g. "/sys/block/vda")
    pub fn block_dir(&self, name: &str) -> PathBuf {
        self.sys_block_dir.join(name)
    }

    /// Device node for a block device name (e.g. "/dev/vda")
    pub fn dev_node(&self, name: &str) -> PathBuf {
        self.dev_dir.join(name)
    }

    /// Resolve a tool to an absolute path.
    ///
    /// Injected locations win; otherwise the context's search path is used.
    pub fn resolve_tool(&self, name: &str) -> Result<PathBuf> {
        if let Some(path) = self.tools.get(name) {
            debug!(tool = name, path = %path.display(), "Using injected tool location");
            return Ok(path.clone());
        }

        which::which_in(name, Some(&self.search_path), Path::new("/"))
            .with_context(|| format!("{} not found in {:?}", name, self.search_path))
    }

    /// Build a command for a tool, with the context's search path as the child's `PATH`
    pub fn command(&self, name: &str) -> Result<Command> {
        let program = self.resolve_tool(name)?;
        let mut cmd = Command::new(program);
        cmd.env("PATH", &self.search_path);
        Ok(cmd)
    }
}
