//! Scripted in-memory transport for unit tests.
//!
//! Understands the handful of commands the syncer issues (home lookup,
//! `mkdir -p`, the digest query) against an in-memory file map, and plays
//! back scripted output for everything else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream};

use super::{BoxedReader, ProcessControl, RemoteProcess, Transport};
use crate::sync::ContentDigest;
use crate::Result;

/// Scripted output for one command.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    pub stdout: Vec<Vec<u8>>,
    pub stderr: Vec<Vec<u8>>,
    pub exit_code: Option<i32>,
    /// Delay between chunks on each stream.
    pub delay: Duration,
    /// Never finish on its own; only `kill` ends it.
    pub hang: bool,
    /// Close both streams but never report an exit until killed.
    pub linger: bool,
}

impl Script {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: vec![stdout.as_bytes().to_vec()],
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn chunks(stdout: &[&str], stderr: &[&str]) -> Self {
        Self {
            stdout: stdout.iter().map(|c| c.as_bytes().to_vec()).collect(),
            stderr: stderr.iter().map(|c| c.as_bytes().to_vec()).collect(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn linger(mut self) -> Self {
        self.linger = true;
        self
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    scripts: Vec<(String, Script)>,
    commands: Vec<String>,
    puts: Vec<(PathBuf, String)>,
}

pub(crate) struct MemoryTransport {
    home: String,
    state: Mutex<State>,
    kills: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new(home: &str) -> Self {
        Self {
            home: home.to_string(),
            state: Mutex::new(State::default()),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Play `script` for any command containing `pattern`.
    pub fn script(&self, pattern: &str, script: Script) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push((pattern.to_string(), script));
    }

    pub fn insert_file(&self, path: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().puts.len()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn builtin(&self, state: &State, line: &str) -> Script {
        if line == "printf %s \"$HOME\"" {
            return Script::ok(&self.home);
        }
        if line.starts_with("mkdir -p ") {
            return Script::ok("");
        }
        if let Some(path) = digest_query_target(line) {
            return match state.files.get(&path) {
                Some(bytes) => Script::ok(&format!(
                    "{}  {}\n",
                    ContentDigest::from_bytes(bytes),
                    path
                )),
                None => Script::ok("not_exists\n"),
            };
        }
        Script::ok("")
    }
}

/// Extract `P` from `if [ -f 'P' ]; then ...`.
fn digest_query_target(line: &str) -> Option<String> {
    let rest = line.strip_prefix("if [ -f '")?;
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

fn feed(chunks: Vec<Vec<u8>>, delay: Duration) -> BoxedReader {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        for chunk in chunks {
            if tx.write_all(&chunk).await.is_err() {
                return;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    });
    Box::new(rx)
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exec(&self, command_line: &str) -> Result<RemoteProcess> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.commands.push(command_line.to_string());
            state
                .scripts
                .iter()
                .find(|(pattern, _)| command_line.contains(pattern.as_str()))
                .map(|(_, s)| s.clone())
                .unwrap_or_else(|| self.builtin(&state, command_line))
        };

        if script.hang {
            let (out_tx, out_rx) = tokio::io::duplex(1024);
            let (err_tx, err_rx) = tokio::io::duplex(1024);
            return Ok(RemoteProcess::new(
                Box::new(out_rx),
                Box::new(err_rx),
                Box::new(MemoryControl {
                    exit_code: None,
                    held: Some((out_tx, err_tx)),
                    lingering: false,
                    kills: self.kills.clone(),
                }),
            ));
        }

        Ok(RemoteProcess::new(
            feed(script.stdout, script.delay),
            feed(script.stderr, script.delay),
            Box::new(MemoryControl {
                exit_code: script.exit_code,
                held: None,
                lingering: script.linger,
                kills: self.kills.clone(),
            }),
        ))
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let bytes = tokio::fs::read(local).await?;
        let mut state = self.state.lock().unwrap();
        state.files.insert(remote.to_string(), bytes);
        state.puts.push((local.to_path_buf(), remote.to_string()));
        Ok(())
    }

    async fn get(&self, remote: &str, local: &Path, recursive: bool) -> Result<()> {
        let entries: Vec<(String, Vec<u8>)> = {
            let state = self.state.lock().unwrap();
            let prefix = format!("{}/", remote.trim_end_matches('/'));
            state
                .files
                .iter()
                .filter(|(path, _)| {
                    path.as_str() == remote || (recursive && path.starts_with(&prefix))
                })
                .map(|(p, b)| (p.clone(), b.clone()))
                .collect()
        };

        let base = remote.trim_end_matches('/');
        let name = base.rsplit('/').next().unwrap_or(base);
        for (path, bytes) in entries {
            let rel = path.strip_prefix(base).unwrap_or("").trim_start_matches('/');
            let target = if rel.is_empty() {
                local.join(name)
            } else {
                local.join(name).join(rel)
            };
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, bytes).await?;
        }
        Ok(())
    }
}

struct MemoryControl {
    exit_code: Option<i32>,
    held: Option<(DuplexStream, DuplexStream)>,
    lingering: bool,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessControl for MemoryControl {
    async fn wait(&mut self) -> Result<Option<i32>> {
        if self.held.is_some() || self.lingering {
            std::future::pending::<()>().await;
        }
        Ok(self.exit_code)
    }

    async fn kill(&mut self) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.held = None;
        self.lingering = false;
        self.exit_code = None;
        Ok(())
    }
}
