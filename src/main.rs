use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use goos_installer::detached;
use goos_installer::medium::NixMounter;
use goos_installer::pipeline::{Orchestrator, SystemPower};
use goos_installer::settings::InstallerSettings;
use goos_installer::wizard::ConsoleWizard;

const LOG_FILE_NAME: &str = "goos-installer.log";

/// Installs GOOS onto a disk of this virtual machine
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Installer settings file (TOML); built-in defaults when omitted
    #[clap(short, long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "goos_installer=trace" (overrides RUST_LOG)
    #[clap(long)]
    log_level: Option<String>,
}

fn init_tracing(log_level: Option<&str>, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let mut guard = None;
    let mut file_error = None;
    let file_layer = log_dir.and_then(|dir| {
        match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE_NAME)
            .build(dir)
        {
            Ok(appender) => {
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                guard = Some(worker_guard);
                Some(fmt::layer().with_ansi(false).with_writer(writer))
            }
            Err(e) => {
                file_error = Some(format!("{}: {}", dir.display(), e));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("File logging disabled: {}", e);
    }
    guard
}

fn print_header() {
    println!("GOOS Installer (Proxmox VM)");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("This installer will ERASE a disk and install GOOS.");
    println!();
    println!("---");
    println!();
}

fn main() {
    let args = Args::parse();

    // A broken settings file must not keep the installer from running
    let (settings, settings_error) = match InstallerSettings::load(args.settings.as_deref()) {
        Ok(settings) => (settings, None),
        Err(e) => (InstallerSettings::default(), Some(e)),
    };

    let _log_guard = init_tracing(args.log_level.as_deref(), settings.log_dir.as_deref());
    if let Some(e) = settings_error {
        warn!("Using default settings: {:#}", e);
    }
    info!("goos-installer {} starting", env!("CARGO_PKG_VERSION"));

    let ctx = settings.exec_context();
    let options = settings.stage_options();

    // Background helpers run for the life of the process and are never awaited
    let _detached = detached::spawn_all(&ctx, &settings.detached);

    print_header();

    let mut orchestrator = Orchestrator::new(&ctx, &options, ConsoleWizard::new(), NixMounter);
    let result = orchestrator.run();
    orchestrator.finish(result, &mut SystemPower)
}
