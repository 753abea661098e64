use crate::{lines, Host};
use diskstrap_core::{DiskInfo, DiskStatus, ProvisionError};
use diskstrap_exec::ShellCommand;

/// Classifies `device`. The first matching check wins: missing device,
/// active mount, existing partitions, any signature, otherwise available.
pub fn check_availability(host: &Host<'_>, device: &str) -> Result<DiskStatus, ProvisionError> {
    tracing::info!(device, "checking disk availability");

    if !host.path_exists(device)? {
        tracing::warn!(device, "device does not exist");
        return Ok(DiskStatus::Unknown);
    }

    let mount_points = mount_points(host, device)?;
    if let Some(mount_point) = mount_points.first() {
        tracing::info!(device, mount_point = %mount_point, "device is mounted");
        return Ok(DiskStatus::InUse);
    }

    let partitions = list_partitions(host, device)?;
    if !partitions.is_empty() {
        tracing::info!(device, count = partitions.len(), "device has existing partitions");
        return Ok(DiskStatus::Formatted);
    }

    let signature = host.query(&host.root("blkid").arg(device))?;
    if signature.success() && !signature.stdout.trim().is_empty() {
        tracing::info!(device, "device carries a filesystem signature");
        return Ok(DiskStatus::Formatted);
    }

    Ok(DiskStatus::Available)
}

/// Best-effort description of `device`; fields that cannot be read keep
/// their zero value.
pub fn get_info(host: &Host<'_>, device: &str) -> DiskInfo {
    let mut info = DiskInfo::empty(device);

    match host.query(&lsblk(["-bdno", "SIZE"], device)) {
        Ok(output) => {
            info.size_bytes = lines(&output.stdout)
                .next()
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(0);
        }
        Err(err) => tracing::debug!(error = %err, "size lookup failed"),
    }

    match mount_points(host, device) {
        Ok(mounts) => info.mount_point = mounts.into_iter().next(),
        Err(err) => tracing::debug!(error = %err, "mount lookup failed"),
    }

    match host.query(&lsblk(["-dno", "FSTYPE"], device)) {
        Ok(output) => info.fs_type = lines(&output.stdout).next().map(str::to_string),
        Err(err) => tracing::debug!(error = %err, "filesystem lookup failed"),
    }

    match list_partitions(host, device) {
        Ok(partitions) => info.partitions = partitions,
        Err(err) => tracing::debug!(error = %err, "partition lookup failed"),
    }

    info
}

/// Partition device paths below `device`, in lsblk order.
pub(crate) fn list_partitions(host: &Host<'_>, device: &str) -> Result<Vec<String>, ProvisionError> {
    let output = host.query(&lsblk(["-lno", "NAME,TYPE"], device))?;
    Ok(parse_partitions(&output.stdout))
}

fn mount_points(host: &Host<'_>, device: &str) -> Result<Vec<String>, ProvisionError> {
    let output = host.query(&lsblk(["-no", "MOUNTPOINT"], device))?;
    Ok(lines(&output.stdout).map(str::to_string).collect())
}

fn lsblk<const N: usize>(flags: [&str; N], device: &str) -> ShellCommand {
    ShellCommand::new("lsblk").args(flags).arg(device)
}

fn parse_partitions(listing: &str) -> Vec<String> {
    lines(listing)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let name = columns.next()?;
            let kind = columns.next()?;
            (kind == "part").then(|| format!("/dev/{}", name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskstrap_exec::ScriptedExecutor;

    fn status_of(exec: &ScriptedExecutor) -> DiskStatus {
        let host = Host::new(exec);
        check_availability(&host, "/dev/sdc").unwrap()
    }

    #[test]
    fn missing_device_is_unknown() {
        let exec = ScriptedExecutor::new().on_exit("test -e /dev/sdc", 1);
        assert_eq!(status_of(&exec), DiskStatus::Unknown);
        assert_eq!(exec.history().len(), 1);
    }

    #[test]
    fn mounted_device_is_in_use() {
        let exec = ScriptedExecutor::new()
            .on_stdout("lsblk -no MOUNTPOINT /dev/sdc", "\n/srv/data\n");
        assert_eq!(status_of(&exec), DiskStatus::InUse);
        assert_eq!(exec.count_program("blkid"), 0);
    }

    #[test]
    fn partitioned_device_is_formatted() {
        let exec = ScriptedExecutor::new()
            .on_stdout("lsblk -lno NAME,TYPE /dev/sdc", "sdc  disk\nsdc1 part\n");
        assert_eq!(status_of(&exec), DiskStatus::Formatted);
    }

    #[test]
    fn bare_signature_is_formatted() {
        let exec = ScriptedExecutor::new()
            .on_stdout("lsblk -lno NAME,TYPE /dev/sdc", "sdc disk\n")
            .on_stdout("sudo blkid /dev/sdc", "/dev/sdc: UUID=\"1b2c\" TYPE=\"xfs\"\n");
        assert_eq!(status_of(&exec), DiskStatus::Formatted);
    }

    #[test]
    fn blank_disk_is_available() {
        let exec = ScriptedExecutor::new()
            .on_stdout("lsblk -lno NAME,TYPE /dev/sdc", "sdc disk\n")
            .on_exit("sudo blkid /dev/sdc", 2);
        assert_eq!(status_of(&exec), DiskStatus::Available);
    }

    #[test]
    fn info_defaults_when_lookups_fail() {
        let exec = ScriptedExecutor::new()
            .on_transport_error("lsblk", "channel closed");
        let host = Host::new(&exec);
        let info = get_info(&host, "/dev/sdc");
        assert_eq!(info, DiskInfo::empty("/dev/sdc"));
        assert_eq!(info.size_display(), "0.00GB");
    }

    #[test]
    fn info_collects_fields() {
        let exec = ScriptedExecutor::new()
            .on_stdout("lsblk -bdno SIZE /dev/nvme1n1", "536870912000\n")
            .on_stdout("lsblk -dno FSTYPE /dev/nvme1n1", "LVM2_member\n")
            .on_stdout(
                "lsblk -lno NAME,TYPE /dev/nvme1n1",
                "nvme1n1   disk\nnvme1n1p1 part\nnvme1n1p2 part\n",
            );
        let host = Host::new(&exec);
        let info = get_info(&host, "/dev/nvme1n1");
        assert_eq!(info.size_display(), "500.00GB");
        assert_eq!(info.mount_point, None);
        assert_eq!(info.fs_type.as_deref(), Some("LVM2_member"));
        assert_eq!(info.partitions, vec!["/dev/nvme1n1p1", "/dev/nvme1n1p2"]);
    }
}
