use crate::{lines, Host};
use diskstrap_core::ProvisionError;
use serde::{Deserialize, Serialize};
use std::fmt;

const FSTAB: &str = "/etc/fstab";
const FSTAB_OPTIONS: &str = "defaults,nofail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystem {
    Ext4,
    Xfs,
    Btrfs,
}

impl FileSystem {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ext4" => Some(FileSystem::Ext4),
            "xfs" => Some(FileSystem::Xfs),
            "btrfs" => Some(FileSystem::Btrfs),
            _ => None,
        }
    }

    /// Like [`FileSystem::parse`] but unknown names become ext4.
    pub fn resolve(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| {
            tracing::warn!(requested = value, "unsupported filesystem, using ext4");
            FileSystem::Ext4
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileSystem::Ext4 => "ext4",
            FileSystem::Xfs => "xfs",
            FileSystem::Btrfs => "btrfs",
        }
    }

    fn mkfs_args(&self) -> &'static [&'static str] {
        match self {
            // Initialize inode tables and journal up front instead of in the background.
            FileSystem::Ext4 => &["-t", "ext4", "-E", "lazy_itable_init=0,lazy_journal_init=0"],
            FileSystem::Xfs => &["-t", "xfs"],
            FileSystem::Btrfs => &["-t", "btrfs"],
        }
    }
}

impl fmt::Display for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountResult {
    pub uuid: Option<String>,
    pub fstab_updated: bool,
}

pub fn format(host: &Host<'_>, device: &str, fs_type: &str) -> Result<FileSystem, ProvisionError> {
    let fs = FileSystem::resolve(fs_type);
    tracing::info!(device, fs = %fs, "formatting");
    host.require(
        &host
            .root("mkfs")
            .args(fs.mkfs_args().iter().copied())
            .arg(device),
    )?;
    Ok(fs)
}

/// Mounts `device` at `mount_point` and records it in `/etc/fstab` by UUID.
///
/// Only the mount itself can fail. A missing UUID or a failed fstab append
/// is logged and reflected in the returned [`MountResult`].
pub fn mount(
    host: &Host<'_>,
    device: &str,
    mount_point: &str,
    fs: FileSystem,
) -> Result<MountResult, ProvisionError> {
    tracing::info!(device, mount_point, "mounting");

    if !host.attempt(&host.root("mkdir").args(["-p", mount_point])) {
        tracing::warn!(mount_point, "could not create mount point");
    }
    host.require(&host.root("mount").args([device, mount_point]))?;

    let uuid = match host.query(&host.root("blkid").args(["-s", "UUID", "-o", "value", device])) {
        Ok(output) if output.success() => lines(&output.stdout).next().map(str::to_string),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(error = %err, "uuid lookup failed");
            None
        }
    };

    let mut result = MountResult {
        uuid,
        fstab_updated: false,
    };
    match &result.uuid {
        Some(uuid) => {
            let entry = fstab_entry(uuid, mount_point, fs);
            result.fstab_updated = host.attempt(
                &host
                    .root("tee")
                    .args(["-a", FSTAB])
                    .stdin(entry.clone())
                    .discard_stdout(),
            );
            if result.fstab_updated {
                tracing::info!(entry = %entry, "fstab updated");
            } else {
                tracing::warn!(entry = %entry, "could not append to fstab");
            }
        }
        None => tracing::warn!(device, "could not get UUID, fstab not updated"),
    }

    if !host.attempt(&host.root("chmod").args(["755", mount_point])) {
        tracing::warn!(mount_point, "could not set mount point permissions");
    }
    Ok(result)
}

pub fn fstab_entry(uuid: &str, mount_point: &str, fs: FileSystem) -> String {
    format!(
        "UUID={} {} {} {} 0 2",
        uuid,
        escape_fstab_field(mount_point),
        fs,
        FSTAB_OPTIONS
    )
}

/// fstab separates fields with whitespace, so it is written as octal.
fn escape_fstab_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            ' ' => escaped.push_str("\\040"),
            '\t' => escaped.push_str("\\011"),
            '\n' => escaped.push_str("\\012"),
            '\\' => escaped.push_str("\\134"),
            other => escaped.push(other),
        }
    }
    escaped
}
