//! In-memory executor for exercising provisioning logic without a host.

use crate::{CommandExecutor, CommandOutput};
use anyhow::{anyhow, Result};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    TransportError(String),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    replies: Vec<Reply>,
    served: usize,
}

impl Rule {
    fn matches(&self, command: &str) -> bool {
        command == self.pattern
            || (command.starts_with(&self.pattern)
                && command[self.pattern.len()..].starts_with(' '))
    }

    /// Replies are served in order; the last one repeats.
    fn next_reply(&mut self) -> Reply {
        let index = self.served.min(self.replies.len() - 1);
        self.served += 1;
        self.replies[index].clone()
    }
}

/// Answers commands from a list of rules and records everything it is asked
/// to run.
///
/// A rule matches a command equal to its pattern or starting with the
/// pattern followed by a space. The first matching rule wins; unmatched
/// commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    history: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.on_sequence(pattern, vec![output])
    }

    pub fn on_stdout(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.on(pattern, CommandOutput::ok(stdout))
    }

    pub fn on_exit(self, pattern: impl Into<String>, exit_code: i32) -> Self {
        self.on(pattern, CommandOutput::failed(exit_code, ""))
    }

    pub fn on_sequence(self, pattern: impl Into<String>, outputs: Vec<CommandOutput>) -> Self {
        let replies = outputs.into_iter().map(Reply::Output).collect();
        self.push_rule(pattern.into(), replies)
    }

    pub fn on_transport_error(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.push_rule(pattern.into(), vec![Reply::TransportError(message.into())])
    }

    fn push_rule(self, pattern: String, replies: Vec<Reply>) -> Self {
        if !replies.is_empty() {
            self.rules
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(Rule {
                    pattern,
                    replies,
                    served: 0,
                });
        }
        self
    }

    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of recorded commands whose program word (after an optional
    /// `sudo`) is `program`.
    pub fn count_program(&self, program: &str) -> usize {
        self.history()
            .iter()
            .filter(|command| program_of(command) == Some(program))
            .count()
    }

    pub fn position_of(&self, prefix: &str) -> Option<usize> {
        self.history()
            .iter()
            .position(|command| command.starts_with(prefix))
    }
}

fn program_of(command: &str) -> Option<&str> {
    let command = command.rsplit(" | ").next().unwrap_or(command);
    let mut words = command.split_whitespace();
    match words.next() {
        Some("sudo") => words.next(),
        other => other,
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command.to_string());
        let mut rules = self
            .rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match rules.iter_mut().find(|rule| rule.matches(command)) {
            Some(rule) => match rule.next_reply() {
                Reply::Output(output) => Ok(output),
                Reply::TransportError(message) => Err(anyhow!(message)),
            },
            None => Ok(CommandOutput::default()),
        }
    }
}
