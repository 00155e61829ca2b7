//! The remote build sequence.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::package::zip_action_source;
use super::policy::{ensure_success, BENIGN_FAILURES};
use crate::config::Config;
use crate::error::RemoteBuildError;
use crate::execution::{CommandExecutor, ExecutionResult, RemoteCommand};
use crate::paths::quote;
use crate::sync::{ContentSyncer, FileArtifact};
use crate::transport::LocalTransport;
use crate::Result;

/// Remote directory compiled sources are copied into before download.
const LANDING_DIR: &str = "~";

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub image_tag: String,
    /// Zip uploaded to the remote host.
    pub remote_archive: String,
    /// Whether the upload actually moved bytes.
    pub archive_transferred: bool,
    pub container_name: String,
    /// Local directory holding the compiled sources.
    pub downloaded: PathBuf,
}

/// Drives one image build and action compile on the remote host.
pub struct BuildWorkflow {
    config: Config,
    remote: Arc<CommandExecutor>,
    local: CommandExecutor,
    syncer: ContentSyncer,
}

impl BuildWorkflow {
    /// `remote` runs on the build host; `local` runs git and friends here.
    pub fn new(config: Config, remote: Arc<CommandExecutor>, local: CommandExecutor) -> Self {
        let mut syncer = ContentSyncer::new(remote.clone());
        if let Some(home) = config.remote.home.clone() {
            syncer = syncer.with_remote_home(home);
        }
        Self {
            config,
            remote,
            local,
            syncer,
        }
    }

    fn docker(&self, args: &str) -> String {
        format!("{} {}", self.config.build.docker, args)
    }

    fn repo_name(&self) -> Result<&str> {
        self.config
            .repository
            .name()
            .ok_or_else(|| RemoteBuildError::Config("repository.url is not set".into()))
    }

    async fn remote_checked(&self, command: RemoteCommand) -> Result<ExecutionResult> {
        let result = self.remote.execute(&command).await?;
        ensure_success(result, &[])
    }

    async fn local_checked(&self, command_line: &str, dir: Option<&str>) -> Result<ExecutionResult> {
        let result = self.local.run(command_line, dir).await?;
        ensure_success(result, BENIGN_FAILURES)
    }

    /// Top level of the local repository.
    pub async fn local_repo_path(&self) -> Result<String> {
        if let Some(path) = &self.config.repository.local_path {
            return Ok(path.to_string_lossy().into_owned());
        }
        let result = self
            .local_checked("git rev-parse --show-toplevel", None)
            .await?;
        Ok(result.stdout_trimmed().to_string())
    }

    /// Commit and push the local repository so the remote can pull it.
    pub async fn update_local_repo(&self, tag: &str) -> Result<()> {
        let repo = self.local_repo_path().await?;
        let branch = quote(&self.config.repository.branch);
        info!("Updating local image repo at {}", repo);
        let cmd = format!(
            "git checkout {b} && git add . && git commit -m {msg} && git push origin {b}",
            b = branch,
            msg = quote(&format!("Update for docker image build: {}", tag)),
        );
        self.local_checked(&cmd, Some(&repo)).await?;
        Ok(())
    }

    /// Clone the repository on the remote host unless it is already there.
    pub async fn ensure_remote_repo(&self) -> Result<String> {
        let name = self.repo_name()?.to_string();
        let check = format!(
            "[ -d ~/{n} ] && echo exists || echo not_exists",
            n = quote(&name)
        );
        let result = self.remote_checked(RemoteCommand::new(check)).await?;

        if result.stdout.contains("not_exists") {
            info!("Remote repository does not exist. Cloning the repository...");
            let clone = format!(
                "git clone {} ~/{}",
                quote(&self.config.repository.url),
                quote(&name)
            );
            self.remote_checked(RemoteCommand::new(clone)).await?;
            info!("Remote repository cloned successfully.");
        }
        Ok(name)
    }

    /// Pull the branch on the remote host and build the image from it.
    pub async fn build_image(&self, tag: &str) -> Result<()> {
        let repo = self.ensure_remote_repo().await?;
        let branch = quote(&self.config.repository.branch);
        let steps = [
            format!("git checkout {}", branch),
            "git fetch".to_string(),
            "git pull".to_string(),
            format!("cd {}", quote(&self.config.repository.build_path)),
            self.docker(&format!("build -t {} .", quote(tag))),
        ];
        let cmd = RemoteCommand::new(steps.join(" && ")).working_dir(format!("~/{}", repo));
        self.remote_checked(cmd).await?;
        info!("Docker image '{}' built successfully on remote machine.", tag);
        Ok(())
    }

    /// Remove the container called `name` if one exists.
    pub async fn ensure_container_absent(&self, name: &str) -> Result<()> {
        let filter = quote(&format!("name=^{}$", name));
        let check = self.docker(&format!(
            "ps -a --filter {} --format '{{{{.Names}}}}'",
            filter
        ));
        let result = self.remote_checked(RemoteCommand::new(check)).await?;

        if result.stdout_lines().any(|line| line.trim() == name) {
            info!("Removing existing container with name {}", name);
            self.remote_checked(RemoteCommand::new(
                self.docker(&format!("rm -f {}", quote(name))),
            ))
            .await?;
        }
        Ok(())
    }

    /// Start a long-running shell container from `tag` and copy the archive in.
    pub async fn start_container(&self, tag: &str, remote_archive: &str) -> Result<String> {
        let build = &self.config.build;
        let name = build.container_name.clone();
        self.ensure_container_absent(&name).await?;

        let run = self.docker(&format!(
            "run -d --name {} --entrypoint=/bin/sh {} -c 'tail -f /dev/null'",
            quote(&name),
            quote(tag)
        ));
        let result = self.remote_checked(RemoteCommand::new(run)).await?;
        if result.stdout_trimmed().is_empty() {
            return Err(RemoteBuildError::CommandFailed {
                command: result.command,
                exit_code: result.exit_code,
                stderr: "docker did not report a container id".into(),
            });
        }
        info!("Container {} started: {}", name, result.stdout_trimmed());

        let copy = self.docker(&format!(
            "cp {} {}:{}",
            quote(remote_archive),
            quote(&name),
            quote(&build.container_workdir)
        ));
        self.remote_checked(RemoteCommand::new(copy)).await?;
        Ok(name)
    }

    /// Compile the action inside a fresh container from `tag`.
    pub async fn compile_package(&self, tag: &str, remote_archive: &str) -> Result<String> {
        let build = &self.config.build;
        let name = build.compile_container.clone();
        self.ensure_container_absent(&name).await?;

        let cmd = self.docker(&format!(
            "run --name {} -i {} -compile {} -debug <{} >{}",
            quote(&name),
            quote(tag),
            quote(&build.function_name),
            quote(remote_archive),
            quote(&build.compile_output)
        ));
        self.remote_checked(RemoteCommand::new(cmd)).await?;
        Ok(name)
    }

    /// Copy compiled sources out of `container` and download them.
    pub async fn download_sources(&self, container: &str) -> Result<PathBuf> {
        let build = &self.config.build;
        let cp = self.docker(&format!(
            "cp {}:{} .",
            quote(container),
            quote(&build.compiled_sources)
        ));
        self.remote_checked(RemoteCommand::new(cp).working_dir(LANDING_DIR))
            .await?;

        let dir_name = build
            .compiled_sources
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("src");
        self.syncer
            .download(
                &format!("{}/{}", LANDING_DIR, dir_name),
                &build.download_dir,
                true,
            )
            .await
    }

    /// Print how to get into the running container by hand.
    pub fn print_instructions(&self, container: &str, archive_name: &str) {
        let remote = &self.config.remote;
        println!(
            "Attach to the container: \n ssh {}@{} && {}",
            remote.user,
            remote.host,
            self.docker(&format!("exec -it {} /bin/sh", container))
        );
        println!(
            "Try compiling the action: \n /bin/proxy -compile {} -debug <{} >o",
            self.config.build.function_name, archive_name
        );
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run(&self, tag: &str) -> Result<WorkflowReport> {
        let build = &self.config.build;
        let source = build
            .source_path
            .as_deref()
            .ok_or_else(|| RemoteBuildError::Config("build.source_path is not set".into()))?;

        if self.config.repository.push {
            self.update_local_repo(tag).await?;
        } else {
            info!("Skipping local commit and push");
        }

        let out_dir = match &build.archive_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let archive = zip_action_source(source, &build.function_name, &out_dir).await?;
        let artifact = FileArtifact::open(&archive).await?;
        let upload = self.syncer.upload(&artifact, &build.remote_dir()).await?;

        self.build_image(tag).await?;

        let remote_archive = upload.remote_path.to_string();
        let container = self.start_container(tag, &remote_archive).await?;
        self.print_instructions(&container, artifact.file_name()?);

        let compiled = self.compile_package(tag, &remote_archive).await?;
        let downloaded = self.download_sources(&compiled).await?;
        info!("Compiled sources downloaded to {}", downloaded.display());

        Ok(WorkflowReport {
            image_tag: tag.to_string(),
            remote_archive,
            archive_transferred: upload.transferred,
            container_name: container,
            downloaded,
        })
    }
}

/// Executor for commands on this machine, echoing to the console.
pub fn local_executor() -> CommandExecutor {
    CommandExecutor::new(Arc::new(LocalTransport::new()))
}

/// Run `command_line` on this machine, optionally from `dir`.
pub async fn run_local(command_line: &str, dir: Option<&str>) -> Result<ExecutionResult> {
    local_executor().run(command_line, dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::NullSink;
    use crate::transport::memory::{MemoryTransport, Script};
    use tempfile::TempDir;

    fn config(source: &std::path::Path, download: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.remote.host = "build.example.org".into();
        config.remote.user = "builder".into();
        config.repository.url = "https://github.com/example/runtime-swift".into();
        config.repository.branch = "test".into();
        config.repository.build_path = "core/swift58Action".into();
        config.repository.push = false;
        config.build.function_name = "GetSourceData".into();
        config.build.source_path = Some(source.to_path_buf());
        config.build.download_dir = download.to_path_buf();
        config
    }

    fn workflow(config: Config, remote: Arc<MemoryTransport>, local: Arc<MemoryTransport>) -> BuildWorkflow {
        let remote = CommandExecutor::new(remote).with_sink(Arc::new(NullSink));
        let local = CommandExecutor::new(local).with_sink(Arc::new(NullSink));
        BuildWorkflow::new(config, Arc::new(remote), local)
    }

    #[tokio::test]
    async fn test_ensure_remote_repo_clones_when_missing() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("[ -d ~/", Script::ok("not_exists\n"));
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        let name = wf.ensure_remote_repo().await.unwrap();

        assert_eq!(name, "runtime-swift");
        let commands = remote.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].starts_with("git clone 'https://github.com/example/runtime-swift'"));
    }

    #[tokio::test]
    async fn test_ensure_remote_repo_skips_clone_when_present() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("[ -d ~/", Script::ok("exists\n"));
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        wf.ensure_remote_repo().await.unwrap();
        assert_eq!(remote.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_build_image_chains_in_repo_dir() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("[ -d ~/", Script::ok("exists\n"));
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        wf.build_image("mn2").await.unwrap();

        let build = remote.commands().pop().unwrap();
        assert_eq!(
            build,
            "cd ~/'runtime-swift' && git checkout 'test' && git fetch && git pull && \
             cd 'core/swift58Action' && sudo docker build -t 'mn2' ."
        );
    }

    #[tokio::test]
    async fn test_build_failure_halts() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("[ -d ~/", Script::ok("exists\n"));
        remote.script(
            "docker build",
            Script::chunks(&["Step 1/4\n"], &["no space left on device\n"]).exit(1),
        );
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        let err = wf.build_image("mn2").await.unwrap_err();
        match err {
            RemoteBuildError::CommandFailed { stderr, .. } => {
                assert!(stderr.contains("no space left"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_existing_container_is_removed() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("ps -a --filter", Script::ok("compiled\n"));
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        wf.ensure_container_absent("compiled").await.unwrap();
        let commands = remote.commands();
        assert_eq!(commands.last().unwrap(), "sudo docker rm -f 'compiled'");
    }

    #[tokio::test]
    async fn test_start_container_requires_id() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("run -d", Script::ok(""));
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        let err = wf
            .start_container("mn2", "/home/builder/GetSourceData/a.zip")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("container id"));
    }

    #[tokio::test]
    async fn test_local_push_tolerates_nothing_to_commit() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        let local = Arc::new(MemoryTransport::new("/home/dev"));
        local.script(
            "git commit",
            Script::ok("nothing to commit, working tree clean\n").exit(1),
        );
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path(), dir.path());
        cfg.repository.local_path = Some(PathBuf::from("/work/runtime"));
        let wf = workflow(cfg, remote, local.clone());

        wf.update_local_repo("mn2").await.unwrap();
        assert!(local.commands()[0].starts_with("cd '/work/runtime' && git checkout 'test'"));
    }

    #[tokio::test]
    async fn test_local_push_failure_halts() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        let local = Arc::new(MemoryTransport::new("/home/dev"));
        local.script(
            "git commit",
            Script::chunks(&[], &["error: failed to push some refs\n"]).exit(1),
        );
        let dir = TempDir::new().unwrap();
        let mut cfg = config(dir.path(), dir.path());
        cfg.repository.local_path = Some(PathBuf::from("/work/runtime"));
        let wf = workflow(cfg, remote, local);

        assert!(wf.update_local_repo("mn2").await.is_err());
    }

    #[tokio::test]
    async fn test_run_local_captures_output() {
        let result = run_local("echo local; echo warn >&2", None).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "local\n");
        assert_eq!(result.stderr, "warn\n");
    }

    #[tokio::test]
    async fn test_download_sources() {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.insert_file("/home/builder/src/main.swift", b"print(1)");
        let dir = TempDir::new().unwrap();
        let wf = workflow(config(dir.path(), dir.path()), remote.clone(), remote.clone());

        let path = wf.download_sources("compiled").await.unwrap();

        let commands = remote.commands();
        assert_eq!(
            commands[0],
            "cd ~ && sudo docker cp 'compiled':'/swiftAction/action/1/src' ."
        );
        assert_eq!(commands[1], "printf %s \"$HOME\"");
        assert_eq!(path, dir.path().join("src"));
        assert!(path.join("main.swift").exists());
    }

    fn full_run_fixture() -> (Arc<MemoryTransport>, TempDir, TempDir, TempDir, Config) {
        let remote = Arc::new(MemoryTransport::new("/home/builder"));
        remote.script("[ -d ~/", Script::ok("exists\n"));
        remote.script("run -d", Script::ok("4f2a9c1e\n"));
        remote.insert_file("/home/builder/src/main.swift", b"print(1)");

        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("main.swift"), "print(0)").unwrap();
        let archives = TempDir::new().unwrap();
        let download = TempDir::new().unwrap();

        let mut cfg = config(source.path(), download.path());
        cfg.build.archive_dir = Some(archives.path().to_path_buf());
        (remote, source, archives, download, cfg)
    }

    #[tokio::test]
    async fn test_run_executes_steps_in_order() {
        let (remote, _source, archives, download, cfg) = full_run_fixture();
        let wf = workflow(cfg, remote.clone(), remote.clone());

        let report = wf.run("mn2").await.unwrap();

        let archive = "/home/builder/GetSourceData/GetSourceData_action.zip";
        assert_eq!(report.image_tag, "mn2");
        assert_eq!(report.remote_archive, archive);
        assert!(report.archive_transferred);
        assert_eq!(report.container_name, "build_container");
        assert_eq!(report.downloaded, download.path().join("src"));
        assert!(report.downloaded.join("main.swift").exists());
        assert!(archives.path().join("GetSourceData_action.zip").exists());
        assert_eq!(remote.put_count(), 1);

        let expected = [
            "printf %s \"$HOME\"".to_string(),
            "mkdir -p '/home/builder/GetSourceData'".to_string(),
            format!("if [ -f '{}' ]", archive),
            "[ -d ~/'runtime-swift' ]".to_string(),
            "cd ~/'runtime-swift' && git checkout 'test'".to_string(),
            "sudo docker ps -a --filter 'name=^build_container$'".to_string(),
            "sudo docker run -d --name 'build_container'".to_string(),
            format!("sudo docker cp '{}' 'build_container':'/swiftAction'", archive),
            "sudo docker ps -a --filter 'name=^compiled$'".to_string(),
            format!(
                "sudo docker run --name 'compiled' -i 'mn2' -compile 'GetSourceData' -debug <'{}' >'o.zip'",
                archive
            ),
            "cd ~ && sudo docker cp 'compiled':'/swiftAction/action/1/src' .".to_string(),
        ];
        let commands = remote.commands();
        assert_eq!(commands.len(), expected.len(), "{commands:#?}");
        for (command, prefix) in commands.iter().zip(expected.iter()) {
            assert!(command.starts_with(prefix.as_str()), "{command} !~ {prefix}");
        }
    }

    #[tokio::test]
    async fn test_run_skips_unchanged_archive() {
        let (remote, _source, _archives, _download, cfg) = full_run_fixture();
        let wf = workflow(cfg, remote.clone(), remote.clone());

        assert!(wf.run("mn2").await.unwrap().archive_transferred);
        assert!(!wf.run("mn2").await.unwrap().archive_transferred);
        assert_eq!(remote.put_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_halts_before_build() {
        let (remote, _source, _archives, _download, cfg) = full_run_fixture();
        remote.script(
            "mkdir -p",
            Script::chunks(&[], &["mkdir: Permission denied\n"]).exit(1),
        );
        let wf = workflow(cfg, remote.clone(), remote.clone());

        let err = wf.run("mn2").await.unwrap_err();

        assert!(matches!(err, RemoteBuildError::CommandFailed { .. }));
        assert_eq!(remote.put_count(), 0);
        assert!(!remote.commands().iter().any(|c| c.contains("docker")));
    }
}
