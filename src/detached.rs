//! Fire-and-forget background programs (guest agent, remote-access daemon).
//!
//! Tasks are started before the pipeline runs and are never joined. The
//! pipeline holds no reference to them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::process::{Child, Stdio};
use tracing::{info, warn};

use crate::context::ExecContext;

/// A background program named in the installer settings
#[derive(Debug, Clone, Deserialize)]
pub struct DetachedSpec {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Handle to a started background program.
///
/// Dropping the handle leaves the process running; nothing ever waits on it.
#[derive(Debug)]
pub struct DetachedTask {
    name: String,
    _child: Child,
    pid: u32,
}

impl DetachedTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Start one background program with inherited stdio
pub fn spawn_detached(ctx: &ExecContext, spec: &DetachedSpec) -> Result<DetachedTask> {
    let mut cmd = ctx.command(&spec.program)?;
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to start {} ({})", spec.name, spec.program))?;
    let pid = child.id();

    info!(task = %spec.name, pid, "Started detached task");
    Ok(DetachedTask {
        name: spec.name.clone(),
        _child: child,
        pid,
    })
}

/// Start every configured background program; failures are logged and skipped
pub fn spawn_all(ctx: &ExecContext, specs: &[DetachedSpec]) -> Vec<DetachedTask> {
    specs
        .iter()
        .filter_map(|spec| match spawn_detached(ctx, spec) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!("Detached task {} not started: {:#}", spec.name, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstallerSettings;
    use std::ffi::OsString;

    fn context() -> ExecContext {
        let mut ctx = InstallerSettings::default().exec_context();
        ctx.search_path = OsString::from("/usr/bin:/bin");
        ctx
    }

    #[test]
    fn test_spawn_true() {
        let spec = DetachedSpec {
            name: "noop".to_string(),
            program: "true".to_string(),
            args: Vec::new(),
        };

        let task = spawn_detached(&context(), &spec).unwrap();
        assert_eq!(task.name(), "noop");
        assert!(task.pid() > 0);
    }

    #[test]
    fn test_missing_program_is_skipped() {
        let specs = vec![DetachedSpec {
            name: "agent".to_string(),
            program: "definitely-not-a-real-guest-agent".to_string(),
            args: Vec::new(),
        }];

        assert!(spawn_all(&context(), &specs).is_empty());
    }
}
