//! Error taxonomy of the provisioning pipeline.
//!
//! Lower layers return `anyhow::Result` with context chains; each pipeline step
//! collapses its chain into one of these variants at the step boundary.

use thiserror::Error;

/// Fatal pipeline errors. None of them is retried.
#[derive(Debug, Error)]
pub enum InstallError {
    /// No mountable installation source after every device and filesystem fallback
    #[error("no installation medium found: {0}")]
    MediumNotFound(String),

    /// The target disk cannot hold the reserved GPT regions plus a non-empty ESP
    #[error("disk too small for EFI install: {total_sectors} sectors (need more than {minimum})")]
    DiskTooSmall { total_sectors: u64, minimum: u64 },

    /// GPT write failed or the re-read table does not match the plan
    #[error("partition disk: {0}")]
    PartitionWriteError(String),

    #[error("format EFI partition: {0}")]
    FormatError(String),

    /// Missing source artifact or failed write onto the ESP
    #[error("stage boot files: {0}")]
    StageError(String),

    /// Post-write integrity check failed
    #[error("verify ESP: {0}")]
    VerifyError(String),

    /// Target disk could not be opened or measured
    #[error("open target disk: {0}")]
    Inventory(String),

    /// The operator declined a confirmation
    #[error("installation cancelled")]
    Cancelled,
}

impl InstallError {
    pub fn medium(err: anyhow::Error) -> Self {
        Self::MediumNotFound(format!("{:#}", err))
    }

    pub fn partition(err: anyhow::Error) -> Self {
        Self::PartitionWriteError(format!("{:#}", err))
    }

    pub fn format(err: anyhow::Error) -> Self {
        Self::FormatError(format!("{:#}", err))
    }

    pub fn stage(err: anyhow::Error) -> Self {
        Self::StageError(format!("{:#}", err))
    }

    pub fn verify(err: anyhow::Error) -> Self {
        Self::VerifyError(format!("{:#}", err))
    }

    pub fn inventory(err: anyhow::Error) -> Self {
        Self::Inventory(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn test_context_chain_is_preserved() {
        let err = Err::<(), _>(anyhow!("No such file or directory"))
            .context("read initramfs.cpio")
            .unwrap_err();

        let stage = InstallError::stage(err);
        assert_eq!(
            stage.to_string(),
            "stage boot files: read initramfs.cpio: No such file or directory"
        );
    }

    #[test]
    fn test_disk_too_small_message() {
        let err = InstallError::DiskTooSmall {
            total_sectors: 1000,
            minimum: 4096,
        };
        assert!(err.to_string().contains("1000 sectors"));
    }
}
