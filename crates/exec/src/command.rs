use std::fmt;

/// A single program invocation rendered into a shell command line.
///
/// Every argument is quoted on render, so device paths, mount points and
/// volume names can be passed in as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    privileged: bool,
    stdin: Option<String>,
    discard_stdout: bool,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
            stdin: None,
            discard_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run through `sudo` when `enabled`.
    pub fn privileged(mut self, enabled: bool) -> Self {
        self.privileged = enabled;
        self
    }

    /// Feed `text` plus a trailing newline on stdin.
    pub fn stdin(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    pub fn discard_stdout(mut self) -> Self {
        self.discard_stdout = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn render(&self) -> String {
        let mut line = String::new();
        if let Some(text) = &self.stdin {
            line.push_str("printf '%s\\n' ");
            line.push_str(&quote(text));
            line.push_str(" | ");
        }
        if self.privileged {
            line.push_str("sudo ");
        }
        line.push_str(&quote(&self.program));
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        if self.discard_stdout {
            line.push_str(" >/dev/null");
        }
        line
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// POSIX shell quoting. Words made only of safe characters pass through
/// untouched, everything else is wrapped in single quotes.
pub fn quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if value.chars().all(is_safe_char) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_are_not_quoted() {
        let cmd = ShellCommand::new("lvcreate")
            .args(["-l", "100%VG", "-n", "github_lv", "github_vg"])
            .privileged(true);
        assert_eq!(cmd.render(), "sudo lvcreate -l 100%VG -n github_lv github_vg");
    }

    #[test]
    fn metacharacters_are_single_quoted() {
        let cmd = ShellCommand::new("mkdir").arg("-p").arg("/mnt/data; rm -rf /");
        assert_eq!(cmd.render(), "mkdir -p '/mnt/data; rm -rf /'");
    }

    #[test]
    fn embedded_single_quotes_are_escaped() {
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn stdin_text_is_piped_through_printf() {
        let cmd = ShellCommand::new("tee")
            .args(["-a", "/etc/fstab"])
            .privileged(true)
            .stdin("UUID=abc /mnt/x ext4 defaults,nofail 0 2")
            .discard_stdout();
        assert_eq!(
            cmd.render(),
            "printf '%s\\n' 'UUID=abc /mnt/x ext4 defaults,nofail 0 2' | sudo tee -a /etc/fstab >/dev/null"
        );
    }
}
