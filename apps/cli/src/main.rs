use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use diskstrap_bootstrap::{inspect, load_plan, BootstrapOutcome, Bootstrapper};
use diskstrap_core::{BootstrapPlan, DiskInfo, DiskStatus};
use diskstrap_exec::{CommandExecutor, LocalExecutor, SshExecutor};
use diskstrap_host_linux::{Host, SettlePolicy};
use diskstrap_report::create_report_for;
use diskstrap_safety::SafetyContext;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "diskstrap", version, about = "Provision a raw disk as an LVM-backed data volume")]
struct Cli {
    /// ssh destination of the target host; commands run locally when absent
    #[arg(long, global = true, env = "DISKSTRAP_HOST")]
    host: Option<String>,

    #[arg(long, global = true, env = "DISKSTRAP_PORT")]
    port: Option<u16>,

    /// Private key passed to ssh with -i
    #[arg(long, global = true, env = "DISKSTRAP_IDENTITY")]
    identity: Option<PathBuf>,

    /// Run privileged commands without sudo (already root on the target)
    #[arg(long, global = true)]
    no_sudo: bool,

    /// Tracing filter, e.g. `info` or `diskstrap_host_linux=debug`
    #[arg(long, global = true, env = "DISKSTRAP_LOG", default_value = "info")]
    log_level: String,

    /// Also write a daily rolling log file into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report the disk's status without changing anything
    Inspect {
        #[arg(long)]
        device: String,
        /// Print the inspection as JSON
        #[arg(long)]
        json: bool,
    },
    /// Wipe if needed, partition, set up LVM, format, mount and verify
    Bootstrap(BootstrapArgs),
}

#[derive(Debug, Args)]
struct BootstrapArgs {
    /// JSON plan file; flags below override its fields
    #[arg(long)]
    plan: Option<PathBuf>,
    #[arg(long)]
    device: Option<String>,
    #[arg(long)]
    mount_point: Option<String>,
    #[arg(long)]
    vg_name: Option<String>,
    #[arg(long)]
    lv_name: Option<String>,
    #[arg(long)]
    fs_type: Option<String>,
    /// `100%VG`, `50%FREE`, `500G`, ...
    #[arg(long)]
    lv_size: Option<String>,
    /// Destroy existing data on the device without prompting
    #[arg(short = 'y', long)]
    yes: bool,
    /// Write a report bundle under `<dir>/reports/`
    #[arg(long)]
    report_base: Option<PathBuf>,
    #[arg(long, default_value_t = 15)]
    settle_timeout_secs: u64,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli.log_level, cli.log_dir.as_deref())?;

    let exec = build_executor(&cli);
    let host = Host::new(exec.as_ref()).with_sudo(!cli.no_sudo);

    match &cli.command {
        Command::Inspect { device, json } => {
            let inspection = inspect(&host, device)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                print_disk(inspection.status, &inspection.info);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Bootstrap(args) => bootstrap(host, args),
    }
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level {}", level))?;
    let console = fmt::layer().with_writer(io::stderr).with_target(false);
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "diskstrap.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .context("install tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("install tracing subscriber")?;
            Ok(None)
        }
    }
}

fn build_executor(cli: &Cli) -> Box<dyn CommandExecutor> {
    match &cli.host {
        Some(destination) => {
            let mut ssh = SshExecutor::new(destination.clone());
            ssh.port = cli.port;
            ssh.identity = cli.identity.clone();
            tracing::info!(host = %destination, "executing over ssh");
            Box::new(ssh)
        }
        None => Box::new(LocalExecutor),
    }
}

fn bootstrap(host: Host<'_>, args: &BootstrapArgs) -> Result<ExitCode> {
    let plan = resolve_plan(args)?;
    let host = host.with_settle(SettlePolicy {
        timeout: Duration::from_secs(args.settle_timeout_secs),
        ..SettlePolicy::default()
    });

    let safety = if args.yes {
        SafetyContext::confirmed_for(plan.device.as_str())
    } else {
        confirm_if_needed(&host, &plan)?
    };

    let outcome = Bootstrapper::new(host, safety).run(&plan);
    print_outcome(&outcome);

    if let Some(base) = &args.report_base {
        let paths = create_report_for(base, &outcome, &outcome.render_log())?;
        println!("report_root: {}", paths.root.display());
    }

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn resolve_plan(args: &BootstrapArgs) -> Result<BootstrapPlan> {
    let mut plan = match (&args.plan, &args.device) {
        (Some(path), _) => load_plan(path)?,
        (None, Some(device)) => BootstrapPlan::new(device.as_str()),
        (None, None) => return Err(anyhow!("--device or --plan is required")),
    };
    let overrides = [
        (&mut plan.device, &args.device),
        (&mut plan.mount_point, &args.mount_point),
        (&mut plan.vg_name, &args.vg_name),
        (&mut plan.lv_name, &args.lv_name),
        (&mut plan.fs_type, &args.fs_type),
        (&mut plan.lv_size, &args.lv_size),
    ];
    for (field, value) in overrides {
        if let Some(value) = value {
            *field = value.clone();
        }
    }
    plan.validate()?;
    Ok(plan)
}

/// Asks on the terminal before a run that would destroy data. A disk that
/// needs no wipe goes ahead unconfirmed.
fn confirm_if_needed(host: &Host<'_>, plan: &BootstrapPlan) -> Result<SafetyContext> {
    let inspection = inspect(host, &plan.device)?;
    if inspection.status != DiskStatus::Formatted {
        return Ok(SafetyContext::unconfirmed());
    }

    print_disk(inspection.status, &inspection.info);
    print!(
        "WARNING: all data on {} will be destroyed. Type 'yes' to continue: ",
        plan.device
    );
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    if answer.trim().eq_ignore_ascii_case("yes") {
        Ok(SafetyContext::confirmed_for(plan.device.as_str()))
    } else {
        tracing::warn!(device = %plan.device, "wipe not confirmed");
        Ok(SafetyContext::unconfirmed())
    }
}

fn print_disk(status: DiskStatus, info: &DiskInfo) {
    println!("Disk: {}", info.device);
    println!("Status: {}", status);
    println!("Size: {}", info.size_display());
    println!("Mounted: {}", info.mount_point.as_deref().unwrap_or("No"));
    println!("Filesystem: {}", info.fs_type.as_deref().unwrap_or("None"));
    if info.partitions.is_empty() {
        println!("Partitions: none");
    } else {
        println!("Partitions: {}", info.partitions.join(", "));
    }
}

fn print_outcome(outcome: &BootstrapOutcome) {
    if let Some(error) = &outcome.error {
        let stage = outcome
            .failed_stage
            .map(|stage| stage.as_str())
            .unwrap_or("unknown");
        println!("bootstrap failed at {}: {}", stage, error);
        println!("progress: {}", outcome.progress());
        return;
    }

    println!("bootstrap completed: {}", outcome.plan.mount_point);
    if let Some(report) = &outcome.verification {
        println!("volume group: {}", if report.vg_exists { "ok" } else { "missing" });
        println!("logical volume: {}", if report.lv_exists { "ok" } else { "missing" });
        println!("mounted: {}", if report.mounted { "yes" } else { "no" });
        if let (Some(size), Some(available)) = (&report.size, &report.available) {
            println!("size: {} (available {})", size, available);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn bootstrap_args(cli: Cli) -> BootstrapArgs {
        match cli.command {
            Command::Bootstrap(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn flags_override_defaults() {
        let args = bootstrap_args(parse(&[
            "diskstrap",
            "bootstrap",
            "--device",
            "/dev/sdd",
            "--vg-name",
            "backup_vg",
            "--lv-size",
            "500G",
            "-y",
        ]));
        assert!(args.yes);
        let plan = resolve_plan(&args).unwrap();
        assert_eq!(plan.device, "/dev/sdd");
        assert_eq!(plan.vg_name, "backup_vg");
        assert_eq!(plan.lv_name, "github_lv");
        assert_eq!(plan.lv_size, "500G");
    }

    #[test]
    fn plan_file_fields_are_overridable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, r#"{"device":"/dev/sdc","mount_point":"/srv/backup"}"#).unwrap();
        let args = bootstrap_args(parse(&[
            "diskstrap",
            "bootstrap",
            "--plan",
            path.to_str().unwrap(),
            "--fs-type",
            "xfs",
        ]));
        let plan = resolve_plan(&args).unwrap();
        assert_eq!(plan.mount_point, "/srv/backup");
        assert_eq!(plan.fs_type, "xfs");
    }

    #[test]
    fn bootstrap_needs_a_device() {
        let args = bootstrap_args(parse(&["diskstrap", "bootstrap"]));
        assert!(resolve_plan(&args).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = parse(&["diskstrap", "inspect", "--device", "/dev/sdc", "--host", "ops@backup-01", "--no-sudo"]);
        assert_eq!(cli.host.as_deref(), Some("ops@backup-01"));
        assert!(cli.no_sudo);
        assert!(matches!(cli.command, Command::Inspect { json: false, .. }));
    }
}
