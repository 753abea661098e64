use crate::Host;
use diskstrap_core::ProvisionError;

/// Writes a fresh GPT label with one LVM partition spanning the disk and
/// waits for its device node. Returns the partition path.
pub fn create_partition(host: &Host<'_>, device: &str) -> Result<String, ProvisionError> {
    tracing::info!(device, "creating partition");

    let steps: [&[&str]; 3] = [
        &["mklabel", "gpt"],
        &["mkpart", "primary", "1MiB", "100%"],
        &["set", "1", "lvm", "on"],
    ];
    for step in steps {
        host.require(
            &host
                .root("parted")
                .args(["-s", device])
                .args(step.iter().copied()),
        )?;
    }

    host.attempt(&host.root("partprobe").arg(device));

    let partition = partition_path(device);
    if !host.settle().wait_until(|| host.path_exists(&partition))? {
        tracing::error!(device, partition = %partition, "partition node never appeared");
        return Err(ProvisionError::PartitionNotFound(partition));
    }
    tracing::info!(partition = %partition, "partition ready");
    Ok(partition)
}

/// Name of the first partition on `device`: `p1` after a trailing digit
/// (`nvme0n1`, `mmcblk0`, `loop0`), `1` otherwise.
///
/// Multipath and device-mapper names follow other conventions and are not
/// handled here.
pub fn partition_path(device: &str) -> String {
    if device.ends_with(|ch: char| ch.is_ascii_digit()) {
        format!("{}p1", device)
    } else {
        format!("{}1", device)
    }
}
