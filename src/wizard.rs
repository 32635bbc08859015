// Interactive console wizard that collects the operator's choices

use anyhow::{Result, bail};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};

use crate::disk::DiskDevice;
use crate::disk::configuration::ProvisioningConfig;
use crate::error::InstallError;
use crate::models::{NetworkMode, NodeRole};
use crate::pipeline::Operator;
use crate::utils::validation;

fn section(title: &str) {
    println!();
    println!("---");
    println!();
    println!("### {}", title);
    println!();
}

fn enabled_label(value: bool) -> &'static str {
    if value { "enabled" } else { "disabled" }
}

/// `Operator` backed by the VM console
pub struct ConsoleWizard {
    theme: ColorfulTheme,
}

impl Default for ConsoleWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleWizard {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    fn prompt_validated(&self, prompt: &str, error: &'static str, check: fn(&str) -> bool) -> Result<String> {
        let value: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .validate_with(move |input: &String| -> Result<(), &str> {
                if check(input) { Ok(()) } else { Err(error) }
            })
            .interact_text()?;
        Ok(value.trim().to_string())
    }

    fn collect_network(&self, config: &mut ProvisioningConfig) -> Result<()> {
        section("2) Network configuration");

        let choice = Select::with_theme(&self.theme)
            .with_prompt("Choose network mode")
            .items(&["DHCP (recommended)", "Static IPv4"])
            .default(0)
            .interact()?;

        if choice == 1 {
            config.network = NetworkMode::Static;
            config.static_ipv4 = self.prompt_validated(
                "IPv4 address (CIDR), e.g. 192.168.1.50/24",
                "Expected an IPv4 address with prefix length",
                validation::is_valid_ipv4_cidr,
            )?;
            config.static_gw = self.prompt_validated(
                "Gateway, e.g. 192.168.1.1",
                "Expected an IPv4 address",
                validation::is_valid_ipv4,
            )?;
            config.static_dns = self.prompt_validated(
                "DNS servers (comma-separated), e.g. 1.1.1.1,8.8.8.8",
                "Expected comma-separated IPv4 addresses",
                validation::is_valid_dns_list,
            )?;
        }
        Ok(())
    }

    fn collect_remote_access(&self, config: &mut ProvisioningConfig) -> Result<()> {
        section("3) Remote access");

        config.ssh_enabled = Confirm::with_theme(&self.theme)
            .with_prompt("Enable SSH server?")
            .default(false)
            .interact()?;

        if config.ssh_enabled {
            let key: String = Input::with_theme(&self.theme)
                .with_prompt("Authorized SSH key (single line, empty to skip)")
                .allow_empty(true)
                .validate_with(|input: &String| -> Result<(), &str> {
                    if validation::is_valid_ssh_public_key(input) {
                        Ok(())
                    } else {
                        Err("Not an OpenSSH public key")
                    }
                })
                .interact_text()?;
            config.ssh_key = key.trim().to_string();
        }
        Ok(())
    }

    fn collect_console_access(&self, config: &mut ProvisioningConfig) -> Result<()> {
        section("4) Console access");
        println!("(Leave empty to disable password login and require SSH key / console-only access.)");

        config.root_password = Password::with_theme(&self.theme)
            .with_prompt("New root password")
            .with_confirmation("Confirm password", "Passwords do not match. Try again.")
            .allow_empty_password(true)
            .interact()?;
        Ok(())
    }

    fn collect_role(&self, config: &mut ProvisioningConfig) -> Result<()> {
        section("5) Node role");

        let choice = Select::with_theme(&self.theme)
            .with_prompt("Choose role")
            .items(&["None (configure later)", "Worker", "Master"])
            .default(0)
            .interact()?;

        config.role = match choice {
            1 => NodeRole::Worker,
            2 => NodeRole::Master,
            _ => NodeRole::None,
        };

        if config.role.needs_join_parameters() {
            config.master_url = self.prompt_validated(
                "Master URL (e.g. https://master.local:8443)",
                "Expected an http(s) URL",
                validation::is_valid_url,
            )?;
            config.join_token = Input::with_theme(&self.theme)
                .with_prompt("Join token")
                .interact_text()?;
        }
        Ok(())
    }
}

impl Operator for ConsoleWizard {
    fn select_target(&mut self, disks: &[DiskDevice]) -> Result<DiskDevice> {
        println!("### 1) Choose installation disk");
        println!();

        if disks.is_empty() {
            bail!("no disks to choose from");
        }
        let items: Vec<String> = disks.iter().map(|disk| disk.to_string()).collect();
        let index = Select::with_theme(&self.theme)
            .with_prompt("Select disk to erase and install to")
            .items(&items)
            .default(0)
            .interact()?;

        Ok(disks[index].clone())
    }

    fn confirm_erase(&mut self, disk: &DiskDevice) -> Result<bool> {
        println!();
        println!("> WARNING: All data on {} will be permanently deleted.", disk.name);
        let proceed = Confirm::with_theme(&self.theme)
            .with_prompt("Proceed with erase?")
            .default(false)
            .interact()?;
        Ok(proceed)
    }

    fn collect_config(&mut self, disk: &DiskDevice) -> Result<ProvisioningConfig> {
        let mut config = ProvisioningConfig {
            disk: disk.name.clone(),
            ..ProvisioningConfig::default()
        };

        self.collect_network(&mut config)?;
        self.collect_remote_access(&mut config)?;
        self.collect_console_access(&mut config)?;
        self.collect_role(&mut config)?;
        Ok(config)
    }

    fn confirm_install(&mut self, config: &ProvisioningConfig) -> Result<bool> {
        section("6) Summary");
        println!("Install target: {}", config.disk);
        println!("Network: {}", config.network);
        println!("SSH: {}", enabled_label(config.ssh_enabled));
        println!("Role: {}", config.role);
        println!();

        let proceed = Confirm::with_theme(&self.theme)
            .with_prompt("Proceed with installation?")
            .default(false)
            .interact()?;
        if proceed {
            println!();
            println!("Installing…");
            println!();
        }
        Ok(proceed)
    }

    fn acknowledge_reboot(&mut self) {
        println!();
        println!("Remove ISO and press Enter to reboot.");
        let mut line = String::new();
        if let Err(e) = std::io::stdin().read_line(&mut line) {
            tracing::warn!("Cannot read console: {}", e);
        }
    }

    fn progress(&mut self, message: &str) {
        println!("* {}", message);
    }

    fn report_error(&mut self, error: &InstallError) {
        println!();
        match error {
            InstallError::Cancelled => println!("Installation cancelled."),
            other => println!("ERROR: {}", other),
        }
    }
}
