//! Local host: runs commands as child processes of pyfleet.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{echo_output, Host};
use crate::config::paths::expand_home;
use crate::domain::HostCommand;
use crate::error::{FleetError, Result};

/// Host gateway for this machine
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    cwd: Option<String>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory currently set with `chdir`
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }
}

#[async_trait]
impl Host for LocalHost {
    fn name(&self) -> &str {
        "localhost"
    }

    async fn run(&self, command: &HostCommand, cwd: Option<&str>, quiet: bool) -> Result<String> {
        let mut process = Command::new(expand_home(&command.program));
        process
            .args(command.args.iter().map(|a| expand_home(a)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = cwd.or(self.cwd.as_deref()) {
            process.current_dir(expand_home(dir));
        }

        debug!(command = %command, cwd = ?cwd.or(self.cwd.as_deref()), "Running local command");
        let output = process.output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::CommandFailed {
                command: command.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        echo_output(self.name(), &stdout, quiet);
        Ok(stdout)
    }

    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<()> {
        let file_name = local_path.file_name().ok_or_else(|| {
            FleetError::Config(format!("'{}' is not a file path", local_path.display()))
        })?;
        let target = PathBuf::from(expand_home(remote_dir)).join(file_name);

        debug!(from = %local_path.display(), to = %target.display(), "Copying file locally");
        tokio::fs::copy(local_path, &target).await?;
        Ok(())
    }

    fn chdir(&mut self, path: &str) -> &mut dyn Host {
        self.cwd = Some(path.to_string());
        self
    }
}
