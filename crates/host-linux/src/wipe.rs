use crate::inspect::list_partitions;
use crate::Host;
use diskstrap_core::ProvisionError;
use std::iter;

/// Megabytes zeroed at the start of the device.
const ZERO_MIB: u32 = 10;

/// Destroys partition tables, LVM labels and filesystem signatures on
/// `device`.
///
/// Only the signature wipe can fail the operation. Unmounting, LVM label
/// removal, zeroing and the kernel re-read are attempted and skipped on
/// error.
pub fn wipe(host: &Host<'_>, device: &str) -> Result<(), ProvisionError> {
    tracing::warn!(device, "wiping disk signatures");

    let partitions = list_partitions(host, device).unwrap_or_default();
    for target in partitions.iter().map(String::as_str).chain(iter::once(device)) {
        host.attempt(&host.root("umount").arg(target));
    }
    for target in partitions.iter().map(String::as_str).chain(iter::once(device)) {
        host.attempt(&host.root("pvremove").args(["-ff", "-y", target]));
    }

    host.require(&host.root("wipefs").args(["-a", device]))?;

    let zeroed = host.attempt(&host.root("dd").args([
        "if=/dev/zero".to_string(),
        format!("of={}", device),
        "bs=1M".to_string(),
        format!("count={}", ZERO_MIB),
        "status=none".to_string(),
    ]));
    if !zeroed {
        tracing::warn!(device, "zeroing the start of the device failed, continuing");
    }
    host.attempt(&host.root("partprobe").arg(device));

    match host
        .settle()
        .wait_until(|| Ok(list_partitions(host, device)?.is_empty()))
    {
        Ok(true) => {}
        Ok(false) => tracing::warn!(device, "kernel still lists partitions after wipe"),
        Err(err) => tracing::warn!(device, error = %err, "could not confirm wipe settled"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskstrap_exec::{CommandOutput, ScriptedExecutor};

    #[test]
    fn wipe_runs_full_sequence() {
        let exec = ScriptedExecutor::new().on_sequence(
            "lsblk -lno NAME,TYPE /dev/sdc",
            vec![
                CommandOutput::ok("sdc disk\nsdc1 part\n"),
                CommandOutput::ok("sdc disk\n"),
            ],
        );
        let host = Host::new(&exec);
        wipe(&host, "/dev/sdc").unwrap();

        let history = exec.history();
        assert_eq!(
            history,
            vec![
                "lsblk -lno NAME,TYPE /dev/sdc",
                "sudo umount /dev/sdc1",
                "sudo umount /dev/sdc",
                "sudo pvremove -ff -y /dev/sdc1",
                "sudo pvremove -ff -y /dev/sdc",
                "sudo wipefs -a /dev/sdc",
                "sudo dd if=/dev/zero of=/dev/sdc bs=1M count=10 status=none",
                "sudo partprobe /dev/sdc",
                "lsblk -lno NAME,TYPE /dev/sdc",
            ]
        );
    }

    #[test]
    fn best_effort_failures_are_tolerated() {
        let exec = ScriptedExecutor::new()
            .on_exit("sudo umount", 32)
            .on_exit("sudo pvremove", 5)
            .on_exit("sudo dd", 1)
            .on_transport_error("sudo partprobe", "timeout");
        let host = Host::new(&exec);
        assert!(wipe(&host, "/dev/sdc").is_ok());
    }

    #[test]
    fn signature_wipe_failure_is_fatal() {
        let exec = ScriptedExecutor::new()
            .on("sudo wipefs", CommandOutput::failed(1, "device busy"));
        let host = Host::new(&exec);
        let err = wipe(&host, "/dev/sdc").unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { exit_code: 1, .. }));
        assert_eq!(exec.count_program("dd"), 0);
    }
}
