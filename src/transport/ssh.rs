//! Transport backed by the system `ssh` and `scp` binaries.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::{ProcessControl, RemoteProcess, Transport};
use crate::config::RemoteSection;
use crate::error::RemoteBuildError;
use crate::Result;

/// Exit code `ssh` uses for its own connection errors.
const SSH_CONNECTION_EXIT: i32 = 255;

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Runs commands over `ssh` and copies files with `scp`.
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    user: String,
    port: u16,
    identity_file: Option<String>,
    label: String,
}

impl SshTransport {
    /// Create a transport for `user@host`.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        let host = host.into();
        let user = user.into();
        let label = format!("ssh {}@{}", user, host);
        Self {
            host,
            user,
            port: 22,
            identity_file: None,
            label,
        }
    }

    /// Build a transport from the `remote` configuration section.
    pub fn from_config(remote: &RemoteSection) -> Result<Self> {
        if remote.host.is_empty() || remote.user.is_empty() {
            return Err(RemoteBuildError::Config(
                "remote host and user are required".into(),
            ));
        }

        let mut transport = Self::new(&remote.host, &remote.user).port(remote.port);
        if let Some(path) = remote.identity_file.as_deref().filter(|p| !p.is_empty()) {
            let expanded = shellexpand::tilde(path).to_string();
            if !Path::new(&expanded).exists() {
                return Err(RemoteBuildError::Config(format!(
                    "identity file not found: {}",
                    expanded
                )));
            }
            transport = transport.identity_file(expanded);
        }
        Ok(transport)
    }

    /// Set the SSH port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the private key used for authentication.
    pub fn identity_file(mut self, path: impl Into<String>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Options shared by `ssh` and `scp`.
    ///
    /// BatchMode keeps a password prompt from hanging a non-interactive run;
    /// keepalives turn a dead connection into an exit instead of a stall.
    fn common_options(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }
        for opt in [
            "BatchMode=yes",
            "ConnectTimeout=10",
            "ServerAliveInterval=15",
            "ServerAliveCountMax=3",
        ] {
            args.push("-o".to_string());
            args.push(opt.to_string());
        }
        args
    }

    fn ssh_args(&self, command_line: &str) -> Vec<String> {
        let mut args = self.common_options();
        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }
        args.push(self.destination());
        args.push(command_line.to_string());
        args
    }

    fn scp_args(&self, recursive: bool) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-q".to_string());
        if recursive {
            args.push("-r".to_string());
        }
        if self.port != 22 {
            args.push("-P".to_string());
            args.push(self.port.to_string());
        }
        args
    }

    async fn run_scp(&self, args: Vec<String>) -> Result<()> {
        debug!("scp {}", args.join(" "));
        let output = Command::new("scp")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RemoteBuildError::Transport(format!("failed to start scp: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RemoteBuildError::Transport(format!(
                "scp exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn name(&self) -> &str {
        &self.label
    }

    async fn exec(&self, command_line: &str) -> Result<RemoteProcess> {
        let mut child = Command::new("ssh")
            .args(self.ssh_args(command_line))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RemoteBuildError::Transport(format!("failed to start ssh: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RemoteBuildError::Transport("ssh stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RemoteBuildError::Transport("ssh stderr not captured".into()))?;

        Ok(RemoteProcess::new(
            Box::new(stdout),
            Box::new(stderr),
            Box::new(SshControl { child }),
        ))
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        info!("Uploading {} to {}:{}", local.display(), self.host, remote);
        let mut args = self.scp_args(false);
        args.push(local.to_string_lossy().into_owned());
        args.push(format!("{}:{}", self.destination(), remote));
        self.run_scp(args).await
    }

    async fn get(&self, remote: &str, local: &Path, recursive: bool) -> Result<()> {
        info!("Downloading {}:{} to {}", self.host, remote, local.display());
        let mut args = self.scp_args(recursive);
        args.push(format!("{}:{}", self.destination(), remote));
        args.push(local.to_string_lossy().into_owned());
        self.run_scp(args).await
    }
}

/// Wraps the local `ssh` client process.
struct SshControl {
    child: Child,
}

#[async_trait]
impl ProcessControl for SshControl {
    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        match status.code() {
            Some(SSH_CONNECTION_EXIT) => Err(RemoteBuildError::Transport(
                "ssh connection failed (exit 255)".into(),
            )),
            code => Ok(code),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}
