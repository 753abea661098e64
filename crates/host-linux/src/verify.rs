use crate::mounts::{mapper_path, parse_mounts};
use crate::{lines, Host};
use diskstrap_core::{ProvisionError, VerificationReport};
use diskstrap_exec::ShellCommand;

/// Re-checks the volume group, logical volume and mount from scratch.
///
/// Never fails: an error while checking marks the report unsuccessful and
/// keeps whatever was learned before it.
pub fn verify(host: &Host<'_>, vg_name: &str, lv_name: &str) -> VerificationReport {
    tracing::info!(vg = vg_name, lv = lv_name, "verifying setup");
    let mut report = VerificationReport::default();
    if let Err(err) = collect(host, vg_name, lv_name, &mut report) {
        tracing::error!(error = %err, "verification aborted");
        report.fail(err);
    }
    report
}

fn collect(
    host: &Host<'_>,
    vg_name: &str,
    lv_name: &str,
    report: &mut VerificationReport,
) -> Result<(), ProvisionError> {
    report.vg_exists = host.query(&host.root("vgdisplay").arg(vg_name))?.success();

    let lv_path = format!("/dev/{}/{}", vg_name, lv_name);
    report.lv_exists = host.query(&host.root("lvdisplay").arg(&lv_path))?.success();

    let table = host.require(&ShellCommand::new("cat").arg("/proc/mounts"))?;
    let mapper = mapper_path(vg_name, lv_name);
    let Some(entry) = parse_mounts(&table.stdout)
        .into_iter()
        .find(|entry| entry.device == lv_path || entry.device == mapper)
    else {
        tracing::warn!(lv = %lv_path, "logical volume is not mounted");
        return Ok(());
    };
    report.mounted = true;
    report.mount_point = Some(entry.mount_point.clone());

    let usage = host.query(&ShellCommand::new("df").args(["-hP", entry.mount_point.as_str()]))?;
    if usage.success() {
        if let Some((size, available)) = parse_df(&usage.stdout) {
            tracing::info!(size = %size, available = %available, "mounted volume usage");
            report.size = Some(size);
            report.available = Some(available);
        }
    }
    Ok(())
}

/// Size and available columns from the last line of `df -hP`.
fn parse_df(output: &str) -> Option<(String, String)> {
    let last = lines(output).last()?;
    let columns: Vec<&str> = last.split_whitespace().collect();
    if columns.len() < 4 {
        return None;
    }
    Some((columns[1].to_string(), columns[3].to_string()))
}
