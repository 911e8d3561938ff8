//! Structured tasks
//!
//! A task is a program with arguments, an optional working directory and
//! extra environment. Plans may still spell a task as a bare string, which
//! runs through `sh -c`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{LockstepError, Result};

/// Shell used for string-form tasks
pub const SHELL: &str = "sh";

/// One command to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TaskRepr")]
pub struct Task {
    /// Program to execute
    pub program: String,
    /// Arguments, passed without shell interpretation
    pub args: Vec<String>,
    /// Working directory, inherited if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskRepr {
    Shell(String),
    Structured {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl From<TaskRepr> for Task {
    fn from(repr: TaskRepr) -> Self {
        match repr {
            TaskRepr::Shell(command) => Task::shell(command),
            TaskRepr::Structured {
                program,
                args,
                cwd,
                env,
            } => Task {
                program,
                args,
                cwd,
                env,
            },
        }
    }
}

impl Task {
    /// Task running `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Task running a command line through the shell
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(SHELL).arg("-c").arg(command)
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn shell_line(&self) -> Option<&str> {
        match self.args.as_slice() {
            [flag, line] if self.program == SHELL && flag == "-c" => Some(line.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.shell_line() {
            return f.write_str(line);
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Rendered command, for logs and reports
    pub command: String,
    /// Exit code, `None` if killed by a signal or never started
    pub exit_code: Option<i32>,
    /// Whether the task exited zero
    pub success: bool,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Last bytes of standard output
    #[serde(default)]
    pub stdout_tail: String,
    /// Last bytes of standard error
    #[serde(default)]
    pub stderr_tail: String,
    /// Spawn failure, if the program could not be started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
}

impl TaskOutcome {
    /// Turn a failed outcome into a `CommandExecution` error
    pub fn check(&self) -> Result<()> {
        if self.success {
            return Ok(());
        }
        let reason = match (&self.spawn_error, self.exit_code) {
            (Some(e), _) => format!("could not start: {}", e),
            (None, Some(code)) => format!("exited with status {}", code),
            (None, None) => "terminated by signal".to_string(),
        };
        Err(LockstepError::CommandExecution {
            command: self.command.clone(),
            exit_code: self.exit_code,
            reason,
        })
    }
}
