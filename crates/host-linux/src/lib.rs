//! Disk provisioning primitives for a Linux host reached through a
//! [`CommandExecutor`].
//!
//! Each operation issues commands one at a time and waits for the result.
//! Non-zero exits from probes are answers, not failures; only the steps
//! that change the disk turn a non-zero exit into a [`ProvisionError`].

use diskstrap_core::ProvisionError;
use diskstrap_exec::{CommandExecutor, CommandOutput, ShellCommand};
use std::thread;
use std::time::{Duration, Instant};

pub mod filesystem;
pub mod inspect;
pub mod lvm;
pub mod mounts;
pub mod partition;
pub mod verify;
pub mod wipe;

pub use filesystem::{format, mount, FileSystem, MountResult};
pub use inspect::{check_availability, get_info};
pub use lvm::{setup_lvm, LvSize};
pub use partition::{create_partition, partition_path};
pub use verify::verify;
pub use wipe::wipe;

/// Bounded polling used while the kernel catches up with partition table
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            interval: Duration::from_millis(500),
        }
    }
}

impl SettlePolicy {
    /// Probe exactly once.
    pub fn immediate() -> Self {
        Self {
            timeout: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }

    /// Runs `probe` until it returns true or the timeout passes. The probe
    /// always runs at least once.
    pub fn wait_until<F>(&self, mut probe: F) -> Result<bool, ProvisionError>
    where
        F: FnMut() -> Result<bool, ProvisionError>,
    {
        let started = Instant::now();
        loop {
            if probe()? {
                return Ok(true);
            }
            if started.elapsed() >= self.timeout {
                return Ok(false);
            }
            thread::sleep(self.interval);
        }
    }
}

/// The target host: how to reach it, whether to escalate, and how long to
/// wait for device nodes.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    exec: &'a dyn CommandExecutor,
    sudo: bool,
    settle: SettlePolicy,
}

impl<'a> Host<'a> {
    pub fn new(exec: &'a dyn CommandExecutor) -> Self {
        Self {
            exec,
            sudo: true,
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn settle(&self) -> SettlePolicy {
        self.settle
    }

    /// A command that needs root on the target.
    pub fn root(&self, program: &str) -> ShellCommand {
        ShellCommand::new(program).privileged(self.sudo)
    }

    /// Runs `command`; only a broken channel is an error.
    pub fn query(&self, command: &ShellCommand) -> Result<CommandOutput, ProvisionError> {
        let line = command.render();
        tracing::debug!(command = %line, "executing");
        let output = self
            .exec
            .execute(&line)
            .map_err(|err| ProvisionError::Transport {
                command: line.clone(),
                message: format!("{:#}", err),
            })?;
        tracing::trace!(command = %line, exit_code = output.exit_code, "finished");
        Ok(output)
    }

    /// Runs `command` and treats a non-zero exit as failure.
    pub fn require(&self, command: &ShellCommand) -> Result<CommandOutput, ProvisionError> {
        let output = self.query(command)?;
        if output.success() {
            return Ok(output);
        }
        let err = ProvisionError::CommandFailed {
            command: command.render(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        };
        tracing::error!(error = %err, "command failed");
        Err(err)
    }

    /// Runs `command` for its side effect and reports whether it worked.
    /// Failures are logged at debug level and otherwise ignored.
    pub fn attempt(&self, command: &ShellCommand) -> bool {
        match self.query(command) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                tracing::debug!(
                    command = %command,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "best-effort step failed"
                );
                false
            }
            Err(err) => {
                tracing::debug!(error = %err, "best-effort step failed");
                false
            }
        }
    }

    pub fn path_exists(&self, path: &str) -> Result<bool, ProvisionError> {
        let output = self.query(&ShellCommand::new("test").args(["-e", path]))?;
        Ok(output.success())
    }
}

/// Non-empty trimmed lines of `text`.
pub(crate) fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}
