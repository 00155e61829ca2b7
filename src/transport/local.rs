//! Transport that runs everything on this machine.
//!
//! Used when the configured host is localhost, for local git steps of the
//! workflow, and in tests that need a real shell.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{ProcessControl, RemoteProcess, Transport};
use crate::error::RemoteBuildError;
use crate::Result;

/// Runs commands through `/bin/sh -c` and copies files on the local disk.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    current_dir: Option<PathBuf>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands from `dir` instead of the process working directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        "local"
    }

    async fn exec(&self, command_line: &str) -> Result<RemoteProcess> {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RemoteBuildError::Transport(format!("failed to start sh: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RemoteBuildError::Transport("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RemoteBuildError::Transport("stderr not captured".into()))?;

        Ok(RemoteProcess::new(
            Box::new(stdout),
            Box::new(stderr),
            Box::new(LocalControl { child }),
        ))
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let target = Path::new(remote);
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = tokio::fs::copy(local, target).await?;
        debug!("copied {} bytes to {}", bytes, remote);
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path, recursive: bool) -> Result<()> {
        let source = PathBuf::from(remote);
        let local = local.to_path_buf();
        tokio::task::spawn_blocking(move || copy_into(&source, &local, recursive)).await?
    }
}

/// Copy `source` into `dest`, mirroring `scp` semantics: when `dest` is an
/// existing directory the source keeps its name inside it.
fn copy_into(source: &Path, dest: &Path, recursive: bool) -> Result<()> {
    let target = if dest.is_dir() {
        let name = source.file_name().ok_or_else(|| {
            RemoteBuildError::InvalidPath(format!("no file name in {}", source.display()))
        })?;
        dest.join(name)
    } else {
        dest.to_path_buf()
    };

    if source.is_dir() {
        if !recursive {
            return Err(RemoteBuildError::InvalidPath(format!(
                "{} is a directory",
                source.display()
            )));
        }
        copy_tree(source, &target)
    } else {
        std::fs::copy(source, &target)?;
        Ok(())
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&path, &dest)?;
        } else {
            std::fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}

struct LocalControl {
    child: Child,
}

#[async_trait]
impl ProcessControl for LocalControl {
    async fn wait(&mut self) -> Result<Option<i32>> {
        Ok(self.child.wait().await?.code())
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}
