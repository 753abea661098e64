use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;

pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

pub const DEFAULT_MOUNT_POINT: &str = "/mnt/github-backup";
pub const DEFAULT_VG_NAME: &str = "github_vg";
pub const DEFAULT_LV_NAME: &str = "github_lv";
pub const DEFAULT_FS_TYPE: &str = "ext4";
pub const DEFAULT_LV_SIZE: &str = "100%VG";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskStatus {
    Available,
    InUse,
    Formatted,
    Unknown,
}

impl DiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskStatus::Available => "available",
            DiskStatus::InUse => "in_use",
            DiskStatus::Formatted => "formatted",
            DiskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a block device. Missing values stay at their
/// zero value instead of failing the lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub device: String,
    pub size_bytes: u64,
    pub mount_point: Option<String>,
    pub fs_type: Option<String>,
    pub partitions: Vec<String>,
}

impl DiskInfo {
    pub fn empty(device: &str) -> Self {
        Self {
            device: device.to_string(),
            ..Self::default()
        }
    }

    pub fn size_display(&self) -> String {
        format!("{:.2}GB", self.size_bytes as f64 / GIB)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapPlan {
    pub device: String,
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    #[serde(default = "default_vg_name")]
    pub vg_name: String,
    #[serde(default = "default_lv_name")]
    pub lv_name: String,
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
    #[serde(default = "default_lv_size")]
    pub lv_size: String,
}

impl BootstrapPlan {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            mount_point: default_mount_point(),
            vg_name: default_vg_name(),
            lv_name: default_lv_name(),
            fs_type: default_fs_type(),
            lv_size: default_lv_size(),
        }
    }

    pub fn logical_volume_path(&self) -> String {
        format!("/dev/{}/{}", self.vg_name, self.lv_name)
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        let fields = [
            ("device", &self.device),
            ("mount_point", &self.mount_point),
            ("vg_name", &self.vg_name),
            ("lv_name", &self.lv_name),
            ("fs_type", &self.fs_type),
            ("lv_size", &self.lv_size),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ProvisionError::InvalidPlan(format!("{} is empty", name)));
            }
        }
        if !self.device.starts_with('/') {
            return Err(ProvisionError::InvalidPlan(format!(
                "device must be an absolute path: {}",
                self.device
            )));
        }
        if !self.mount_point.starts_with('/') {
            return Err(ProvisionError::InvalidPlan(format!(
                "mount_point must be an absolute path: {}",
                self.mount_point
            )));
        }
        Ok(())
    }
}

fn default_mount_point() -> String {
    DEFAULT_MOUNT_POINT.to_string()
}

fn default_vg_name() -> String {
    DEFAULT_VG_NAME.to_string()
}

fn default_lv_name() -> String {
    DEFAULT_LV_NAME.to_string()
}

fn default_fs_type() -> String {
    DEFAULT_FS_TYPE.to_string()
}

fn default_lv_size() -> String {
    DEFAULT_LV_SIZE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub vg_exists: bool,
    pub lv_exists: bool,
    pub mounted: bool,
    pub mount_point: Option<String>,
    pub size: Option<String>,
    pub available: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self {
            vg_exists: false,
            lv_exists: false,
            mounted: false,
            mount_point: None,
            size: None,
            available: None,
            success: true,
            error: None,
        }
    }
}

impl VerificationReport {
    /// Marks the report failed, keeping every field filled so far.
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.success = false;
        self.error = Some(error.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvisionError {
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("`{command}` exited with {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("`{command}` could not be executed: {message}")]
    Transport { command: String, message: String },
    #[error("partition {0} did not appear")]
    PartitionNotFound(String),
    #[error("refused: {0}")]
    Refused(String),
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

impl ProvisionError {
    /// The command that failed, when the error came from the host.
    pub fn command(&self) -> Option<&str> {
        match self {
            ProvisionError::CommandFailed { command, .. } => Some(command.as_str()),
            ProvisionError::Transport { command, .. } => Some(command.as_str()),
            _ => None,
        }
    }
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
