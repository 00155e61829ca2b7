//! Content-addressed uploads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::digest::FileArtifact;
use super::record::{digest_query, RemoteFileRecord, NOT_EXISTS};
use crate::error::RemoteBuildError;
use crate::execution::CommandExecutor;
use crate::paths::{self, RemotePath};
use crate::Result;

const HOME_QUERY: &str = "printf %s \"$HOME\"";

/// What an upload did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Canonical remote path of the file.
    pub remote_path: RemotePath,
    /// Whether bytes were sent. `false` means the remote copy already matched.
    pub transferred: bool,
}

/// Uploads files only when the remote copy differs.
pub struct ContentSyncer {
    executor: Arc<CommandExecutor>,
    home: OnceCell<String>,
}

impl ContentSyncer {
    pub fn new(executor: Arc<CommandExecutor>) -> Self {
        Self {
            executor,
            home: OnceCell::new(),
        }
    }

    /// Use a known remote home directory instead of asking the remote shell.
    pub fn with_remote_home(self, home: impl Into<String>) -> Self {
        Self {
            executor: self.executor,
            home: OnceCell::new_with(Some(home.into())),
        }
    }

    /// The remote home directory, queried once and then reused.
    pub async fn remote_home(&self) -> Result<&str> {
        let home = self
            .home
            .get_or_try_init(|| async {
                let result = self.executor.run(HOME_QUERY, None).await?;
                if result.failed() {
                    return Err(result.into_error());
                }
                let home = result.stdout_trimmed().to_string();
                if !home.starts_with('/') {
                    return Err(RemoteBuildError::Transport(format!(
                        "remote reported an unusable home directory: '{}'",
                        home
                    )));
                }
                debug!("remote home is {}", home);
                Ok::<_, RemoteBuildError>(home)
            })
            .await?;
        Ok(home.as_str())
    }

    /// Canonicalize a remote path, expanding `~` against the remote home.
    pub async fn resolve(&self, raw: &str) -> Result<RemotePath> {
        if paths::needs_home(raw) {
            let home = self.remote_home().await?;
            RemotePath::resolve(raw, home)
        } else {
            RemotePath::concrete(raw.trim())
        }
    }

    /// Ask the remote side what currently sits at `path`.
    pub async fn query(&self, path: &RemotePath) -> Result<RemoteFileRecord> {
        let result = self.executor.run(&digest_query(path), None).await?;
        if result.failed() && !result.mentions(NOT_EXISTS) {
            return Err(result.into_error());
        }
        Ok(RemoteFileRecord::parse(path.clone(), &result.stdout))
    }

    /// Upload `artifact` into `remote_dir` unless an identical copy is there.
    pub async fn upload(&self, artifact: &FileArtifact, remote_dir: &str) -> Result<SyncOutcome> {
        let dir = self.resolve(remote_dir).await?;
        let mkdir = self
            .executor
            .run(&format!("mkdir -p {}", dir.quoted()), None)
            .await?;
        if mkdir.failed() {
            return Err(mkdir.into_error());
        }

        let remote_path = dir.join(artifact.file_name()?);
        let record = self.query(&remote_path).await?;

        if record.matches(artifact.digest()) {
            info!(
                "{} already at {} ({}), skipping upload",
                artifact.path().display(),
                remote_path,
                artifact.digest().short()
            );
            return Ok(SyncOutcome {
                remote_path,
                transferred: false,
            });
        }

        if record.exists {
            info!("{} differs from local copy, uploading", remote_path);
        } else {
            info!("{} not present, uploading", remote_path);
        }
        self.executor
            .transport()
            .put(artifact.path(), remote_path.as_str())
            .await?;
        info!("Uploaded {} ({})", remote_path, artifact.digest().short());

        Ok(SyncOutcome {
            remote_path,
            transferred: true,
        })
    }

    /// Fetch `remote` into the local directory `local_dir`.
    ///
    /// Returns the local path of the downloaded file or directory.
    pub async fn download(
        &self,
        remote: &str,
        local_dir: &Path,
        recursive: bool,
    ) -> Result<PathBuf> {
        let remote_path = self.resolve(remote).await?;
        tokio::fs::create_dir_all(local_dir).await?;
        info!("Downloading {} into {}", remote_path, local_dir.display());
        self.executor
            .transport()
            .get(remote_path.as_str(), local_dir, recursive)
            .await?;
        Ok(local_dir.join(remote_path.file_name()))
    }
}
