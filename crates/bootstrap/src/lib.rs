//! Turns a raw block device into a mounted, LVM-backed data volume.
//!
//! [`Bootstrapper::run`] walks a fixed sequence of stages and stops at the
//! first one that fails. Nothing is rolled back: the returned
//! [`BootstrapOutcome`] records how far the run got so an operator can
//! resume or clean up by hand.

use anyhow::{anyhow, Context, Result};
use diskstrap_core::{
    now_utc_rfc3339, BootstrapPlan, DiskInfo, DiskStatus, ProvisionError, VerificationReport,
};
use diskstrap_host_linux::{
    check_availability, create_partition, format, get_info, mount, setup_lvm, verify, wipe,
    FileSystem, Host, MountResult,
};
use diskstrap_safety::{can_wipe_disk, SafetyContext, SafetyDecision};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Instant;

pub mod layout;

pub use layout::{create_data_directories, DirectoryResult, DATA_DIRECTORIES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Inspecting,
    Wiping,
    Partitioning,
    ProvisioningLvm,
    Formatting,
    Mounting,
    CreatingDirectories,
    Verifying,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Inspecting => "inspecting",
            Stage::Wiping => "wiping",
            Stage::Partitioning => "partitioning",
            Stage::ProvisioningLvm => "provisioning_lvm",
            Stage::Formatting => "formatting",
            Stage::Mounting => "mounting",
            Stage::CreatingDirectories => "creating_directories",
            Stage::Verifying => "verifying",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at_utc: String,
    pub duration_ms: u128,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapOutcome {
    pub plan: BootstrapPlan,
    pub stage: Stage,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub failed_command: Option<String>,
    pub status: Option<DiskStatus>,
    pub disk_info: Option<DiskInfo>,
    pub wiped: bool,
    pub partition: Option<String>,
    pub logical_volume: Option<String>,
    pub filesystem: Option<FileSystem>,
    pub mount: Option<MountResult>,
    pub directories: Vec<DirectoryResult>,
    pub verification: Option<VerificationReport>,
    pub trace: Vec<StageRecord>,
}

impl BootstrapOutcome {
    fn new(plan: &BootstrapPlan) -> Self {
        Self {
            plan: plan.clone(),
            stage: Stage::Inspecting,
            failed_stage: None,
            error: None,
            failed_command: None,
            status: None,
            disk_info: None,
            wiped: false,
            partition: None,
            logical_volume: None,
            filesystem: None,
            mount: None,
            directories: Vec::new(),
            verification: None,
            trace: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Everything an operator needs to pick up where the run stopped.
    pub fn progress(&self) -> String {
        format!(
            "device={} status={} partition={} lv={} mount_point={}",
            self.plan.device,
            self.status.map(|status| status.as_str()).unwrap_or("-"),
            self.partition.as_deref().unwrap_or("-"),
            self.logical_volume.as_deref().unwrap_or("-"),
            self.plan.mount_point,
        )
    }

    /// One line per stage plus the final result, for the run report.
    pub fn render_log(&self) -> String {
        let mut logs = Vec::new();
        logs.push("workflow=bootstrap".to_string());
        logs.push(format!("device={}", self.plan.device));
        for record in &self.trace {
            logs.push(format!(
                "stage={} ok={} started_at={} duration_ms={} {}",
                record.stage, record.ok, record.started_at_utc, record.duration_ms, record.detail
            ));
        }
        match (&self.failed_stage, &self.error) {
            (Some(stage), Some(error)) => logs.push(format!("result=failed stage={} error={}", stage, error)),
            _ => logs.push(format!("result={}", self.stage)),
        }
        logs.join("\n")
    }
}

/// Result of a check-only run.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub status: DiskStatus,
    pub info: DiskInfo,
}

pub fn inspect(host: &Host<'_>, device: &str) -> Result<Inspection, ProvisionError> {
    let status = check_availability(host, device)?;
    let info = get_info(host, device);
    Ok(Inspection { status, info })
}

struct StageFailure {
    stage: Stage,
    error: ProvisionError,
}

pub struct Bootstrapper<'a> {
    host: Host<'a>,
    safety: SafetyContext,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(host: Host<'a>, safety: SafetyContext) -> Self {
        Self { host, safety }
    }

    pub fn run(&self, plan: &BootstrapPlan) -> BootstrapOutcome {
        tracing::info!(device = %plan.device, "starting bootstrap");
        let mut outcome = BootstrapOutcome::new(plan);
        match self.drive(plan, &mut outcome) {
            Ok(()) => {
                outcome.stage = Stage::Done;
                tracing::info!(mount_point = %plan.mount_point, "bootstrap completed");
            }
            Err(failure) => {
                tracing::error!(
                    stage = %failure.stage,
                    error = %failure.error,
                    progress = %outcome.progress(),
                    "bootstrap failed"
                );
                outcome.stage = Stage::Failed;
                outcome.failed_stage = Some(failure.stage);
                outcome.failed_command = failure.error.command().map(str::to_string);
                outcome.error = Some(failure.error.to_string());
            }
        }
        outcome
    }

    fn drive(&self, plan: &BootstrapPlan, outcome: &mut BootstrapOutcome) -> Result<(), StageFailure> {
        let host = &self.host;

        let status = run_stage(outcome, Stage::Inspecting, |outcome| {
            plan.validate()?;
            let status = check_availability(host, &plan.device)?;
            let info = get_info(host, &plan.device);
            tracing::info!(device = %plan.device, status = %status, size = %info.size_display(), "disk inspected");
            outcome.status = Some(status);
            outcome.disk_info = Some(info);
            match status {
                DiskStatus::InUse => Err(ProvisionError::Refused(format!(
                    "{} is already in use",
                    plan.device
                ))),
                DiskStatus::Unknown => Err(ProvisionError::Refused(format!(
                    "{} not found",
                    plan.device
                ))),
                other => Ok(other),
            }
        })?;

        if status == DiskStatus::Formatted {
            run_stage(outcome, Stage::Wiping, |outcome| {
                if let SafetyDecision::Deny(reason) = can_wipe_disk(&self.safety, &plan.device) {
                    return Err(ProvisionError::Refused(reason));
                }
                tracing::warn!(device = %plan.device, "disk has existing data, wiping");
                wipe(host, &plan.device)?;
                outcome.wiped = true;
                Ok(())
            })?;
        }

        let partition = run_stage(outcome, Stage::Partitioning, |outcome| {
            let partition = create_partition(host, &plan.device)?;
            outcome.partition = Some(partition.clone());
            Ok(partition)
        })?;

        let logical_volume = run_stage(outcome, Stage::ProvisioningLvm, |outcome| {
            let lv = setup_lvm(host, &partition, &plan.vg_name, &plan.lv_name, &plan.lv_size)?;
            outcome.logical_volume = Some(lv.clone());
            Ok(lv)
        })?;

        let fs = run_stage(outcome, Stage::Formatting, |outcome| {
            let fs = format(host, &logical_volume, &plan.fs_type)?;
            outcome.filesystem = Some(fs);
            Ok(fs)
        })?;

        run_stage(outcome, Stage::Mounting, |outcome| {
            let result = mount(host, &logical_volume, &plan.mount_point, fs)?;
            outcome.mount = Some(result);
            Ok(())
        })?;

        run_stage(outcome, Stage::CreatingDirectories, |outcome| {
            outcome.directories = create_data_directories(host, &plan.mount_point);
            Ok(())
        })?;

        run_stage(outcome, Stage::Verifying, |outcome| {
            let report = verify(host, &plan.vg_name, &plan.lv_name);
            let failure = (!report.success).then(|| {
                report
                    .error
                    .clone()
                    .unwrap_or_else(|| "verification reported failure".to_string())
            });
            tracing::info!(
                available = report.available.as_deref().unwrap_or("unknown"),
                "verification finished"
            );
            outcome.verification = Some(report);
            match failure {
                Some(reason) => Err(ProvisionError::VerificationFailed(reason)),
                None => Ok(()),
            }
        })
    }
}

fn run_stage<T>(
    outcome: &mut BootstrapOutcome,
    stage: Stage,
    work: impl FnOnce(&mut BootstrapOutcome) -> Result<T, ProvisionError>,
) -> Result<T, StageFailure> {
    tracing::info!(stage = %stage, "entering stage");
    outcome.stage = stage;
    let started_at_utc = now_utc_rfc3339();
    let started = Instant::now();
    let result = work(outcome);
    let duration_ms = started.elapsed().as_millis();
    let (ok, detail) = match &result {
        Ok(_) => (true, outcome.progress()),
        Err(error) => (false, format!("{} error={}", outcome.progress(), error)),
    };
    outcome.trace.push(StageRecord {
        stage,
        started_at_utc,
        duration_ms,
        ok,
        detail,
    });
    result.map_err(|error| StageFailure { stage, error })
}

/// Reads a JSON plan file. Missing optional fields take their defaults.
pub fn load_plan(path: impl AsRef<Path>) -> Result<BootstrapPlan> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read plan {}", path.display()))?;
    let plan: BootstrapPlan = serde_json::from_str(&data)
        .with_context(|| format!("parse plan {}", path.display()))?;
    plan.validate().map_err(|err| anyhow!("{}: {}", path.display(), err))?;
    Ok(plan)
}
