//! Remote host over SSH.
//!
//! Commands go through the system `ssh` binary, files through `scp`. All
//! invocations of one handle share a control-master session whose socket
//! lives in a private temporary directory; dropping the handle closes the
//! session, whichever way the action ended.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use super::{echo_output, Host};
use crate::domain::command::{shell_quote, shell_word};
use crate::domain::HostCommand;
use crate::error::{FleetError, Result};

/// Host gateway for a remote machine
pub struct SshHost {
    /// SSH destination (`user@address` or `address`)
    destination: String,
    /// Wrap commands in a login shell
    shell: bool,
    cwd: Option<String>,
    control_dir: TempDir,
}

impl SshHost {
    pub fn new(address: &str, user: Option<&str>, shell: bool) -> Result<Self> {
        let destination = match user {
            Some(user) => format!("{}@{}", user, address),
            None => address.to_string(),
        };
        let control_dir = tempfile::Builder::new().prefix("pyfleet-ssh-").tempdir()?;

        Ok(Self {
            destination,
            shell,
            cwd: None,
            control_dir,
        })
    }

    /// Get the SSH destination
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("master")
    }

    /// Options shared by `ssh` and `scp` so both reuse one session
    fn session_options(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path().display()),
            "-o".to_string(),
            "ControlPersist=yes".to_string(),
        ]
    }

    /// Build the remote command line
    fn remote_line(&self, command: &HostCommand, cwd: Option<&str>) -> String {
        let mut line = command.to_shell_line();
        if let Some(dir) = cwd.or(self.cwd.as_deref()) {
            line = format!("cd {} && {}", shell_word(dir), line);
        }
        if self.shell {
            line = format!("bash -l -c {}", shell_quote(&line));
        }
        line
    }
}

#[async_trait]
impl Host for SshHost {
    fn name(&self) -> &str {
        &self.destination
    }

    async fn run(&self, command: &HostCommand, cwd: Option<&str>, quiet: bool) -> Result<String> {
        let line = self.remote_line(command, cwd);
        debug!(host = %self.destination, %line, "Running remote command");

        let output = Command::new("ssh")
            .args(self.session_options())
            .arg(&self.destination)
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::CommandFailed {
                command: command.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        echo_output(&self.destination, &stdout, quiet);
        Ok(stdout)
    }

    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<()> {
        let target = format!("{}:{}/", self.destination, remote_dir.trim_end_matches('/'));
        debug!(from = %local_path.display(), to = %target, "Uploading file");

        let output = Command::new("scp")
            .args(self.session_options())
            .arg("-q")
            .arg(local_path)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::CommandFailed {
                command: format!("scp {} {}", local_path.display(), target),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    fn chdir(&mut self, path: &str) -> &mut dyn Host {
        self.cwd = Some(path.to_string());
        self
    }
}

impl Drop for SshHost {
    fn drop(&mut self) {
        if !self.control_path().exists() {
            return;
        }

        // Best effort: the master may already be gone.
        let status = std::process::Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path().display()))
            .args(["-O", "exit"])
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        debug!(host = %self.destination, ?status, "Closed SSH session");
    }
}
