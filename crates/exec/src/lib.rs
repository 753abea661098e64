use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::{Command, Output};

pub mod command;
pub mod scripted;

pub use command::{quote, ShellCommand};
pub use scripted::ScriptedExecutor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn from_process(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            // killed by a signal
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

/// Runs one command line on the target host and waits for it to finish.
///
/// A non-zero exit status is a normal result. `Err` is reserved for the
/// channel itself failing.
pub trait CommandExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        (**self).execute(command)
    }
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for Box<T> {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        (**self).execute(command)
    }
}

/// Executes through `sh -c` on the machine running diskstrap.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl CommandExecutor for LocalExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .with_context(|| format!("run sh -c {}", command))?;
        Ok(CommandOutput::from_process(output))
    }
}

/// Executes through the system `ssh` client in batch mode. Authentication
/// and host keys are whatever the user's ssh configuration provides.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    pub destination: String,
    pub port: Option<u16>,
    pub identity: Option<PathBuf>,
    pub connect_timeout_secs: u64,
}

/// Exit status ssh reserves for its own errors.
const SSH_ERROR_EXIT: i32 = 255;

impl SshExecutor {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            port: None,
            identity: None,
            connect_timeout_secs: 30,
        }
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(self.destination.clone());
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

impl CommandExecutor for SshExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("ssh")
            .args(self.ssh_args(command))
            .output()
            .with_context(|| format!("spawn ssh to {}", self.destination))?;
        let output = CommandOutput::from_process(output);
        if output.exit_code == SSH_ERROR_EXIT {
            return Err(anyhow!(
                "ssh to {} failed: {}",
                self.destination,
                output.stderr.trim()
            ));
        }
        tracing::trace!(destination = %self.destination, exit_code = output.exit_code, "ssh command finished");
        Ok(output)
    }
}
