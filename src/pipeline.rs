//! Provisioning Orchestrator.
//!
//! Runs `SelectTarget → ConfirmErase → CollectConfig → Partition → Stage →
//! Verify → Reboot`. Any failure, including an operator declining a
//! confirmation, ends in `Halt`; there are no retries. The installer never
//! returns to its caller: `finish` either reboots or parks forever.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::context::ExecContext;
use crate::disk::configuration::ProvisioningConfig;
use crate::disk::{BlockDevice, DeviceFile, DiskDevice, LinuxDiskAccess, partition};
use crate::error::InstallError;
use crate::medium::{MediumLocator, Mounter};
use crate::stage::{FilesystemStager, StageOptions, StageReport};
use crate::verify::verify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    SelectTarget,
    ConfirmErase,
    CollectConfig,
    Partition,
    Stage,
    Verify,
    Reboot,
    Halt,
}

/// Terminal outcome of one run
#[derive(Debug)]
pub enum InstallResult {
    Success(StageReport),
    Fatal(InstallError),
}

impl InstallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallResult::Success(_))
    }
}

/// The person at the console
pub trait Operator {
    fn select_target(&mut self, disks: &[DiskDevice]) -> Result<DiskDevice>;

    /// Last chance before the disk is erased
    fn confirm_erase(&mut self, disk: &DiskDevice) -> Result<bool>;

    fn collect_config(&mut self, disk: &DiskDevice) -> Result<ProvisioningConfig>;

    fn confirm_install(&mut self, config: &ProvisioningConfig) -> Result<bool>;

    /// Block until the operator is ready for the reboot (medium removed)
    fn acknowledge_reboot(&mut self);

    fn progress(&mut self, _message: &str) {}

    fn report_error(&mut self, _error: &InstallError) {}
}

pub trait PowerControl {
    fn reboot(&mut self) -> Result<()>;

    /// Park forever
    fn halt(&mut self) -> !;
}

/// Power control of the running machine
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPower;

const HALT_POLL: Duration = Duration::from_secs(10);

impl PowerControl for SystemPower {
    fn reboot(&mut self) -> Result<()> {
        LinuxDiskAccess::sync_filesystems();
        match nix::sys::reboot::reboot(nix::sys::reboot::RebootMode::RB_AUTOBOOT) {
            Ok(never) => match never {},
            Err(e) => Err(anyhow::Error::from(e).context("reboot request failed")),
        }
    }

    fn halt(&mut self) -> ! {
        warn!("Installer halted; reset the console to continue");
        loop {
            std::thread::sleep(HALT_POLL);
        }
    }
}

pub struct Orchestrator<'a, O: Operator, M: Mounter> {
    ctx: &'a ExecContext,
    options: &'a StageOptions,
    operator: O,
    mounter: M,
    load_modules: bool,
    history: Vec<InstallState>,
}

impl<'a, O: Operator, M: Mounter> Orchestrator<'a, O, M> {
    pub fn new(ctx: &'a ExecContext, options: &'a StageOptions, operator: O, mounter: M) -> Self {
        Self {
            ctx,
            options,
            operator,
            mounter,
            load_modules: true,
            history: Vec::new(),
        }
    }

    /// Skip kernel module loading during medium discovery
    pub fn without_module_loading(mut self) -> Self {
        self.load_modules = false;
        self
    }

    /// States visited so far, in order
    pub fn history(&self) -> &[InstallState] {
        &self.history
    }

    pub fn state(&self) -> Option<InstallState> {
        self.history.last().copied()
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn mounter(&self) -> &M {
        &self.mounter
    }

    fn enter(&mut self, state: InstallState) {
        debug!(from = ?self.state(), to = ?state, "Installer state transition");
        self.history.push(state);
    }

    /// Run the pipeline once, up to `Reboot` or `Halt`
    pub fn run(&mut self) -> InstallResult {
        match self.run_steps() {
            Ok(report) => {
                self.enter(InstallState::Reboot);
                info!("Installation complete");
                InstallResult::Success(report)
            }
            Err(e) => {
                error!("Installation failed: {}", e);
                self.enter(InstallState::Halt);
                InstallResult::Fatal(e)
            }
        }
    }

    fn run_steps(&mut self) -> Result<StageReport, InstallError> {
        self.enter(InstallState::SelectTarget);
        let disks = LinuxDiskAccess::list_available_disks(self.ctx);
        let disk = self
            .operator
            .select_target(&disks)
            .map_err(operator_failure)?;
        info!("Selected target disk {}", disk);

        self.enter(InstallState::ConfirmErase);
        if !self.operator.confirm_erase(&disk).map_err(operator_failure)? {
            return Err(InstallError::Cancelled);
        }

        self.enter(InstallState::CollectConfig);
        let config = self
            .operator
            .collect_config(&disk)
            .map_err(operator_failure)?;
        if !self
            .operator
            .confirm_install(&config)
            .map_err(operator_failure)?
        {
            return Err(InstallError::Cancelled);
        }

        self.enter(InstallState::Partition);
        self.operator.progress("Partitioning disk…");
        let device = DeviceFile::for_disk(&disk);
        let size = device.size_bytes().map_err(InstallError::inventory)?;
        let plan = partition::plan(&disk.with_size(size))?;

        // The medium is needed for staging; find it before anything is written
        let mut locator = MediumLocator::new(self.ctx, &mut self.mounter);
        if !self.load_modules {
            locator = locator.without_module_loading();
        }
        let medium = locator.locate_and_mount()?;

        device.partition(&plan).map_err(InstallError::partition)?;

        self.enter(InstallState::Stage);
        let operator = &mut self.operator;
        let report = FilesystemStager::new(&device, self.options)
            .stage_with_progress(&plan, &medium, &config, |message| operator.progress(message))?;

        self.enter(InstallState::Verify);
        verify(&device)?;

        Ok(report)
    }

    /// Act on the outcome of `run`: reboot after success, otherwise halt
    pub fn finish<P: PowerControl>(mut self, result: InstallResult, power: &mut P) -> ! {
        match result {
            InstallResult::Success(_) => {
                self.operator.progress("Installation complete.");
                self.operator.acknowledge_reboot();
                if let Err(e) = power.reboot() {
                    error!("{:#}", e);
                    self.operator.progress("Reboot failed; drop to console.");
                }
                power.halt()
            }
            InstallResult::Fatal(e) => {
                self.operator.report_error(&e);
                power.halt()
            }
        }
    }
}

fn operator_failure(err: anyhow::Error) -> InstallError {
    warn!("Operator input failed: {:#}", err);
    InstallError::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediumFsType;
    use crate::settings::InstallerSettings;
    use anyhow::bail;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Answers every question from a script
    struct ScriptedOperator {
        confirm_erase: bool,
        confirm_install: bool,
    }

    impl ScriptedOperator {
        fn agreeing() -> Self {
            Self {
                confirm_erase: true,
                confirm_install: true,
            }
        }
    }

    impl Operator for ScriptedOperator {
        fn select_target(&mut self, disks: &[DiskDevice]) -> Result<DiskDevice> {
            Ok(disks[0].clone())
        }

        fn confirm_erase(&mut self, _disk: &DiskDevice) -> Result<bool> {
            Ok(self.confirm_erase)
        }

        fn collect_config(&mut self, disk: &DiskDevice) -> Result<ProvisioningConfig> {
            Ok(ProvisioningConfig {
                disk: disk.name.clone(),
                ..ProvisioningConfig::default()
            })
        }

        fn confirm_install(&mut self, _config: &ProvisioningConfig) -> Result<bool> {
            Ok(self.confirm_install)
        }

        fn acknowledge_reboot(&mut self) {}
    }

    #[derive(Default)]
    struct RefusingMounter {
        calls: usize,
    }

    impl Mounter for RefusingMounter {
        fn mount_readonly(&mut self, _device: &Path, _target: &Path, _fs_type: MediumFsType) -> Result<()> {
            self.calls += 1;
            bail!("not a medium")
        }
    }

    struct FakePower {
        fail_reboot: bool,
    }

    impl PowerControl for FakePower {
        fn reboot(&mut self) -> Result<()> {
            if self.fail_reboot {
                bail!("EPERM");
            }
            Ok(())
        }

        fn halt(&mut self) -> ! {
            panic!("halted");
        }
    }

    fn context(root: &TempDir, disk_bytes: u64) -> ExecContext {
        let mut ctx = InstallerSettings::default().exec_context();
        ctx.sys_block_dir = root.path().join("sys/block");
        ctx.dev_dir = root.path().join("dev");
        ctx.mount_point = root.path().join("mnt/iso");
        ctx.legacy_devices = Vec::new();
        fs::create_dir_all(ctx.block_dir("vdb")).unwrap();
        fs::create_dir_all(&ctx.dev_dir).unwrap();
        fs::write(ctx.block_dir("vdb").join("size"), format!("{}\n", disk_bytes / 512)).unwrap();
        fs::write(ctx.block_dir("vdb").join("ro"), "0\n").unwrap();
        let image = fs::File::create(ctx.dev_node("vdb")).unwrap();
        image.set_len(disk_bytes).unwrap();
        ctx
    }

    #[test]
    fn test_declined_erase_halts_before_partitioning() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 64 * 1024 * 1024);
        let options = StageOptions::default();
        let operator = ScriptedOperator {
            confirm_erase: false,
            ..ScriptedOperator::agreeing()
        };

        let mut orchestrator =
            Orchestrator::new(&ctx, &options, operator, RefusingMounter::default())
                .without_module_loading();
        let result = orchestrator.run();

        assert!(matches!(result, InstallResult::Fatal(InstallError::Cancelled)));
        assert_eq!(
            orchestrator.history(),
            &[
                InstallState::SelectTarget,
                InstallState::ConfirmErase,
                InstallState::Halt
            ]
        );
        assert_eq!(orchestrator.mounter().calls, 0);
    }

    #[test]
    fn test_declined_install_halts() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 64 * 1024 * 1024);
        let options = StageOptions::default();
        let operator = ScriptedOperator {
            confirm_install: false,
            ..ScriptedOperator::agreeing()
        };

        let mut orchestrator =
            Orchestrator::new(&ctx, &options, operator, RefusingMounter::default())
                .without_module_loading();
        assert!(!orchestrator.run().is_success());
        assert_eq!(orchestrator.state(), Some(InstallState::Halt));
        assert!(!orchestrator.history().contains(&InstallState::Partition));
    }

    #[test]
    fn test_missing_medium_halts_before_any_write() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 64 * 1024 * 1024);
        let options = StageOptions::default();

        let mut orchestrator = Orchestrator::new(
            &ctx,
            &options,
            ScriptedOperator::agreeing(),
            RefusingMounter::default(),
        )
        .without_module_loading();
        let result = orchestrator.run();

        assert!(matches!(
            result,
            InstallResult::Fatal(InstallError::MediumNotFound(_))
        ));
        assert_eq!(orchestrator.state(), Some(InstallState::Halt));

        let image = fs::read(ctx.dev_node("vdb")).unwrap();
        assert!(image.iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "halted")]
    fn test_fatal_result_halts() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 64 * 1024 * 1024);
        let options = StageOptions::default();
        let orchestrator = Orchestrator::new(
            &ctx,
            &options,
            ScriptedOperator::agreeing(),
            RefusingMounter::default(),
        );

        orchestrator.finish(
            InstallResult::Fatal(InstallError::Cancelled),
            &mut FakePower { fail_reboot: false },
        );
    }

    #[test]
    #[should_panic(expected = "halted")]
    fn test_failed_reboot_halts() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 64 * 1024 * 1024);
        let options = StageOptions::default();
        let orchestrator = Orchestrator::new(
            &ctx,
            &options,
            ScriptedOperator::agreeing(),
            RefusingMounter::default(),
        );

        orchestrator.finish(
            InstallResult::Success(StageReport::default()),
            &mut FakePower { fail_reboot: true },
        );
    }
}
