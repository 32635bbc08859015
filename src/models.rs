// Shared value types for the provisioning pipeline

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Dhcp,
    Static,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Dhcp => "dhcp",
            NetworkMode::Static => "static",
        }
    }

    /// Parse the persisted form; anything unrecognised falls back to DHCP
    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "static" => NetworkMode::Static,
            _ => NetworkMode::Dhcp,
        }
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    None,
    Worker,
    Master,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::None => "none",
            NodeRole::Worker => "worker",
            NodeRole::Master => "master",
        }
    }

    pub fn from_config_value(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "worker" => NodeRole::Worker,
            "master" => NodeRole::Master,
            _ => NodeRole::None,
        }
    }

    /// Worker and master nodes need a master URL and a join token
    pub fn needs_join_parameters(&self) -> bool {
        !matches!(self, NodeRole::None)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filesystem types an installation medium may be mounted as, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumFsType {
    Iso9660,
    Udf,
}

impl MediumFsType {
    pub const FALLBACK_ORDER: [MediumFsType; 2] = [MediumFsType::Iso9660, MediumFsType::Udf];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediumFsType::Iso9660 => "iso9660",
            MediumFsType::Udf => "udf",
        }
    }
}

impl std::fmt::Display for MediumFsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A mounted read-only installation source.
///
/// Lives for the duration of the pipeline; it is never unmounted explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootMedium {
    /// Device node that was mounted (e.g. "/dev/sr0")
    pub device: PathBuf,
    /// Filesystem type the mount succeeded with
    pub fs_type: MediumFsType,
    /// Where the medium is mounted
    pub mount_point: PathBuf,
}

impl BootMedium {
    /// Resolve a path inside the mounted medium
    pub fn path(&self, relative: &str) -> PathBuf {
        self.mount_point.join(relative.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_mode_parsing() {
        assert_eq!(NetworkMode::from_config_value("static"), NetworkMode::Static);
        assert_eq!(NetworkMode::from_config_value("dhcp"), NetworkMode::Dhcp);
        assert_eq!(NetworkMode::from_config_value("garbage"), NetworkMode::Dhcp);
    }

    #[test]
    fn test_node_role_parsing() {
        assert_eq!(NodeRole::from_config_value("worker"), NodeRole::Worker);
        assert_eq!(NodeRole::from_config_value("Master"), NodeRole::Master);
        assert_eq!(NodeRole::from_config_value(""), NodeRole::None);
        assert!(!NodeRole::None.needs_join_parameters());
        assert!(NodeRole::Worker.needs_join_parameters());
    }

    #[test]
    fn test_medium_path_strips_leading_slash() {
        let medium = BootMedium {
            device: PathBuf::from("/dev/sr0"),
            fs_type: MediumFsType::Iso9660,
            mount_point: PathBuf::from("/mnt/iso"),
        };
        assert_eq!(medium.path("/boot/vmlinuz"), PathBuf::from("/mnt/iso/boot/vmlinuz"));
        assert_eq!(medium.path("boot/vmlinuz"), PathBuf::from("/mnt/iso/boot/vmlinuz"));
    }
}
