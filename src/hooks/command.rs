//! External commands run in the live installation directory.

use super::{InstallHook, Launcher};
use crate::core::DeployError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Lines of stderr kept in a failure report.
const STDERR_TAIL_LINES: usize = 20;

/// A configured command line such as `["npm", "install"]`.
#[derive(Debug, Clone)]
pub struct CommandHook {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandHook {
    /// Fails with [`DeployError::Config`] if `argv` is empty.
    pub fn new(
        name: impl Into<String>,
        argv: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, DeployError> {
        let name = name.into();
        let mut argv = argv.into_iter();
        let program = argv.next().filter(|p| !p.trim().is_empty()).ok_or_else(|| {
            DeployError::Config {
                message: format!("{name} command must name a program"),
            }
        })?;

        Ok(Self {
            name,
            program,
            args: argv.collect(),
            timeout,
        })
    }

    /// Full command line for display.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn failed(&self, reason: impl Into<String>) -> DeployError {
        DeployError::HookFailed {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Resolves the program: paths are taken relative to the live directory,
    /// bare names are looked up on `PATH`.
    fn resolve_program(&self, live_path: &Path) -> Result<PathBuf, DeployError> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 || program.is_absolute() {
            return Ok(if program.is_absolute() {
                program.to_path_buf()
            } else {
                live_path.join(program)
            });
        }
        which::which(&self.program)
            .map_err(|e| self.failed(format!("'{}' not found on PATH: {e}", self.program)))
    }

    fn command(&self, live_path: &Path) -> Result<Command, DeployError> {
        let program = self.resolve_program(live_path)?;
        let mut cmd = Command::new(program);
        cmd.args(&self.args).current_dir(live_path).stdin(Stdio::null());
        Ok(cmd)
    }
}

#[async_trait]
impl InstallHook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, live_path: &Path) -> Result<(), DeployError> {
        let mut cmd = self.command(live_path)?;
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        debug!(hook = %self.name, command = %self.command_line(), cwd = %live_path.display(), "Running hook");
        let start = std::time::Instant::now();

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| self.failed(format!("failed to start: {e}")))?,
            Err(_) => {
                warn!(hook = %self.name, timeout_secs = self.timeout.as_secs(), "Hook timed out");
                return Err(self.failed(format!(
                    "timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            let status = output
                .status
                .code()
                .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
            return Err(self.failed(if tail.is_empty() {
                status
            } else {
                format!("{status}\n{tail}")
            }));
        }

        info!(hook = %self.name, elapsed_ms = start.elapsed().as_millis(), "Hook completed");
        Ok(())
    }
}

#[async_trait]
impl Launcher for CommandHook {
    async fn launch(&self, live_path: &Path) -> Result<(), DeployError> {
        let mut cmd = self.command(live_path)?;
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| self.failed(format!("failed to start: {e}")))?;
        info!(
            hook = %self.name,
            command = %self.command_line(),
            pid = ?child.id(),
            "Application launched"
        );
        // Dropping the handle leaves the process running
        drop(child);
        Ok(())
    }
}
