//! remote-build binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use remote_build::cli::{self, Args};
use remote_build::config::Config;
use remote_build::transport::{is_local_host, LocalTransport, SshTransport, Transport};
use remote_build::workflow::{local_executor, BuildWorkflow};
use remote_build::{logging, CommandExecutor};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'remote-build --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(Some(config.log_filter()));

    match run(&args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let tag = args.image_tag.clone().unwrap_or_default();

    info!("remote-build v{}", env!("CARGO_PKG_VERSION"));

    let transport: Arc<dyn Transport> = if is_local_host(&config.remote.host) {
        info!("Target host is local, running commands in place");
        Arc::new(LocalTransport::new())
    } else {
        Arc::new(SshTransport::from_config(&config.remote)?)
    };

    let remote = CommandExecutor::new(transport)
        .with_default_timeout(config.execution.timeout())
        .with_buffer_size(config.execution.read_buffer_size);
    let local = local_executor().with_buffer_size(config.execution.read_buffer_size);

    let workflow = BuildWorkflow::new(config, Arc::new(remote), local);
    let report = workflow.run(&tag).await?;

    info!(
        "Image {} built, sources in {} (archive {})",
        report.image_tag,
        report.downloaded.display(),
        if report.archive_transferred {
            "uploaded"
        } else {
            "unchanged"
        }
    );
    Ok(())
}
