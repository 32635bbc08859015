/// Operator choices persisted onto the ESP as a flat key=value file
use serde::{Deserialize, Serialize};

use crate::models::{NetworkMode, NodeRole};

/// Recognised keys, in the order they are written
pub const CONFIG_KEYS: [&str; 11] = [
    "disk",
    "network",
    "static_ipv4",
    "static_gw",
    "static_dns",
    "ssh_enabled",
    "ssh_key",
    "root_password",
    "role",
    "master_url",
    "join_token",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Target disk name (e.g. "vda")
    pub disk: String,
    pub network: NetworkMode,
    /// Address in CIDR notation, only meaningful with static networking
    pub static_ipv4: String,
    pub static_gw: String,
    /// Comma separated resolvers
    pub static_dns: String,
    pub ssh_enabled: bool,
    pub ssh_key: String,
    pub root_password: String,
    pub role: NodeRole,
    pub master_url: String,
    pub join_token: String,
}

impl ProvisioningConfig {
    /// Value of one recognised key in its persisted form
    fn value_of(&self, key: &str) -> Option<String> {
        let value = match key {
            "disk" => self.disk.clone(),
            "network" => self.network.as_str().to_string(),
            "static_ipv4" => self.static_ipv4.clone(),
            "static_gw" => self.static_gw.clone(),
            "static_dns" => self.static_dns.clone(),
            "ssh_enabled" => self.ssh_enabled.to_string(),
            "ssh_key" => self.ssh_key.clone(),
            "root_password" => self.root_password.clone(),
            "role" => self.role.as_str().to_string(),
            "master_url" => self.master_url.clone(),
            "join_token" => self.join_token.clone(),
            _ => return None,
        };
        Some(value)
    }

    /// Render the config file.
    ///
    /// Values are written verbatim: an embedded newline or `=` is not escaped
    /// and will not survive a round trip.
    pub fn to_config_content(&self) -> String {
        let mut content = String::new();
        for key in CONFIG_KEYS {
            let value = self.value_of(key).unwrap_or_default();
            content.push_str(&format!("{}={}\n", key, value));
        }
        content
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.to_config_content().into_bytes()
    }

    /// Parse a config file; unknown keys are ignored and missing keys keep their defaults
    pub fn from_config_content(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            match key {
                "disk" => config.disk = value.to_string(),
                "network" => config.network = NetworkMode::from_config_value(value),
                "static_ipv4" => config.static_ipv4 = value.to_string(),
                "static_gw" => config.static_gw = value.to_string(),
                "static_dns" => config.static_dns = value.to_string(),
                "ssh_enabled" => config.ssh_enabled = value.trim() == "true",
                "ssh_key" => config.ssh_key = value.to_string(),
                "root_password" => config.root_password = value.to_string(),
                "role" => config.role = NodeRole::from_config_value(value),
                "master_url" => config.master_url = value.to_string(),
                "join_token" => config.join_token = value.to_string(),
                _ => {
                    // Ignore unknown keys
                }
            }
        }

        config
    }
}

/// Parse persisted configuration text
pub fn parse_config(content: &str) -> ProvisioningConfig {
    ProvisioningConfig::from_config_content(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProvisioningConfig {
        ProvisioningConfig {
            disk: "vda".to_string(),
            network: NetworkMode::Static,
            static_ipv4: "10.0.0.5/24".to_string(),
            static_gw: "10.0.0.1".to_string(),
            static_dns: "1.1.1.1,8.8.8.8".to_string(),
            ssh_enabled: true,
            ssh_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA operator@host".to_string(),
            root_password: "s3cret".to_string(),
            role: NodeRole::Worker,
            master_url: "https://10.0.0.2:6443".to_string(),
            join_token: "abcdef.0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let config = sample();
        assert_eq!(config.serialize(), config.clone().serialize());
    }

    #[test]
    fn test_every_key_once_in_order() {
        let content = sample().to_config_content();
        let keys: Vec<&str> = content
            .lines()
            .map(|line| line.split_once('=').unwrap().0)
            .collect();
        assert_eq!(keys, CONFIG_KEYS);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_default_config_content() {
        let content = ProvisioningConfig::default().to_config_content();
        assert_eq!(
            content,
            "disk=\nnetwork=dhcp\nstatic_ipv4=\nstatic_gw=\nstatic_dns=\nssh_enabled=false\n\
             ssh_key=\nroot_password=\nrole=none\nmaster_url=\njoin_token=\n"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let config = sample();
        assert_eq!(parse_config(&config.to_config_content()), config);
    }

    #[test]
    fn test_parse_ignores_unknown_and_defaults_missing() {
        let config = parse_config("disk=sda\nfavourite_colour=blue\r\nnot a pair\n");
        assert_eq!(config.disk, "sda");
        assert_eq!(config.network, NetworkMode::Dhcp);
        assert_eq!(config.role, NodeRole::None);
        assert!(!config.ssh_enabled);
    }

    #[test]
    fn test_values_are_not_escaped() {
        let config = ProvisioningConfig {
            root_password: "a=b\nrole=master".to_string(),
            ..ProvisioningConfig::default()
        };
        let content = config.to_config_content();
        assert!(content.contains("root_password=a=b\nrole=master\n"));

        // The injected role line is overridden by the real one that follows
        let parsed = parse_config(&content);
        assert_eq!(parsed.root_password, "a=b");
        assert_eq!(parsed.role, NodeRole::None);
    }
}
