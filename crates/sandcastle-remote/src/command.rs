//! Command model shared by every backend.
//!
//! Commands are an explicit program plus argument list. Backends that only
//! accept a single command line render it with [`CommandSpec::to_shell_line`],
//! which quotes every argument; nothing here ever splits a string on spaces.

use crate::error::{RemoteError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A command to run inside a remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Directory to run in (session default when `None`).
    pub cwd: Option<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// When set, the command is started in the background with stdout and
    /// stderr redirected to this file, and `exec` returns immediately.
    pub detach_log: Option<String>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            detach_log: None,
        }
    }

    /// Run `script` through `sh -c`.
    ///
    /// Use this when the caller genuinely wants shell syntax (pipes,
    /// redirections). The script is one argument; it is not re-tokenized.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set the working directory unless one is already set.
    pub fn cwd_or(mut self, dir: impl Into<String>) -> Self {
        if self.cwd.is_none() {
            self.cwd = Some(dir.into());
        }
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Start detached, logging to `log_path`.
    pub fn detached(mut self, log_path: impl Into<String>) -> Self {
        self.detach_log = Some(log_path.into());
        self
    }

    /// Whether this command is started in the background.
    pub fn is_detached(&self) -> bool {
        self.detach_log.is_some()
    }

    /// Render as a single POSIX shell command line.
    ///
    /// Every word is quoted, so arguments containing spaces, quotes, `$`,
    /// backticks or newlines reach the program unchanged.
    pub fn to_shell_line(&self) -> Result<String> {
        let mut words = Vec::with_capacity(self.env.len() + self.args.len() + 1);
        for (key, value) in &self.env {
            if !is_env_name(key) {
                return Err(RemoteError::InvalidCommand(format!(
                    "invalid environment variable name: {key:?}"
                )));
            }
            words.push(format!("{key}={}", quote(value)?));
        }
        words.push(quote(&self.program)?);
        for arg in &self.args {
            words.push(quote(arg)?);
        }

        let mut line = words.join(" ");
        if let Some(log) = &self.detach_log {
            line = format!("nohup {line} > {} 2>&1 < /dev/null", quote(log)?);
        }
        if let Some(dir) = &self.cwd {
            line = format!("cd {} && {line}", quote(dir)?);
        }
        if self.detach_log.is_some() {
            line.push_str(" &");
        }
        Ok(line)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.len() > 64 {
                write!(f, " <{} bytes>", arg.len())?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

fn quote(word: &str) -> Result<String> {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .map_err(|e| RemoteError::InvalidCommand(format!("cannot quote {word:?}: {e}")))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Result of running a command remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    /// Standard output.
    #[serde(default)]
    pub stdout: String,
    /// Standard error.
    #[serde(default)]
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
