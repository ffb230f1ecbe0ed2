//! Subprocess executor - runs command lines through `sh -c`

use crate::command::{CommandError, CommandExecutor, CommandOutput, Invocation};
use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Executes command lines with the system shell
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Path to the shell
    shell: String,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

/// Owns a spawned process group and kills all of it unless the leader exited
struct GroupGuard {
    child: AsyncGroupChild,
    exited: bool,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.exited {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            debug!("Process group already gone: {}", e);
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    /// Run the command and capture its output
    ///
    /// The command runs as the leader of its own process group. Dropping
    /// this future kills the group, so a job timeout also stops anything
    /// the step started.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        debug!(
            "Spawning `{}` in {}",
            invocation.command,
            invocation.working_dir.display()
        );

        if !invocation.working_dir.is_dir() {
            return Err(CommandError::Spawn {
                command: invocation.command.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!(
                        "working directory {} does not exist",
                        invocation.working_dir.display()
                    ),
                ),
            });
        }

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&invocation.command)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.group_spawn().map_err(|source| CommandError::Spawn {
            command: invocation.command.clone(),
            source,
        })?;
        let mut guard = GroupGuard {
            child,
            exited: false,
        };

        let mut stdout = guard.child.inner().stdout.take();
        let mut stderr = guard.child.inner().stderr.take();
        let (status, stdout, stderr) = tokio::try_join!(
            guard.child.wait(),
            read_pipe(stdout.as_mut()),
            read_pipe(stderr.as_mut()),
        )
        .map_err(|source| CommandError::Wait {
            command: invocation.command.clone(),
            source,
        })?;
        guard.exited = true;

        let result = CommandOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };

        if !result.is_success() {
            warn!("`{}` failed: {}", invocation.command, result.describe_failure());
        }

        Ok(result)
    }
}
