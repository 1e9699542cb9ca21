// iamrestore/src/utils/command.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::fs::File;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{AppError, Result};

/// A fully resolved external command: program, arguments and an optional file
/// streamed to its stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin_file: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin_file: None,
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

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }
}

#[cfg(test)]
impl Invocation {
    /// Value of the argument following `-e`, if any.
    pub fn statement(&self) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == "-e")
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Value of a `--name=value` style flag, if present.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{}=", name);
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '\\') {
                write!(f, " \"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        if let Some(path) = &self.stdin_file {
            write!(f, " < {}", path.display())?;
        }
        Ok(())
    }
}

/// Runs external commands. Success means the process exited with status zero.
pub trait CommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn spawn_and_wait(&self, invocation: &Invocation) -> Result<std::process::Output> {
        let rendered = invocation.to_string();
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let input = match &invocation.stdin_file {
            Some(path) => {
                cmd.stdin(Stdio::piped());
                Some(open_input(path).await?)
            }
            None => {
                cmd.stdin(Stdio::null());
                None
            }
        };

        let mut child = cmd.spawn().map_err(|source| AppError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        // Stream the input while the child drains its own output; the copy task
        // closes stdin when it finishes so the client sees EOF.
        let feeder = match (input, child.stdin.take()) {
            (Some(mut file), Some(mut stdin)) => Some(tokio::spawn(async move {
                let copied = tokio::io::copy(&mut file, &mut stdin).await;
                drop(stdin);
                copied
            })),
            _ => None,
        };

        let output = child.wait_with_output().await?;

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(bytes)) => debug!("Streamed {} bytes into `{}`", bytes, rendered),
                // A client that exits early closes the pipe; its exit status reports the failure.
                Ok(Err(e)) => debug!("Input stream to `{}` ended early: {}", rendered, e),
                Err(e) => debug!("Input task for `{}` did not complete: {}", rendered, e),
            }
        }
        Ok(output)
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        let rendered = invocation.to_string();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.spawn_and_wait(invocation))
                .await
                .map_err(|_| AppError::Timeout {
                    command: rendered.clone(),
                    seconds: limit.as_secs(),
                })??,
            None => self.spawn_and_wait(invocation).await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("stdout of `{}`:\n{}", rendered, stdout.trim_end());
        }

        if !output.status.success() {
            return Err(AppError::Command {
                command: rendered,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

async fn open_input(path: &Path) -> Result<File> {
    File::open(path).await.map_err(|e| {
        AppError::InvalidInput(format!("cannot open {} for reading: {}", path.display(), e))
    })
}

/// Runs `program args...` and returns its trimmed stdout.
pub async fn capture_stdout(program: &str, args: &[&str]) -> Result<String> {
    let rendered = Invocation::new(program).args(args.iter().copied()).to_string();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| AppError::Spawn {
            command: rendered.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(AppError::Command {
            command: rendered,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
