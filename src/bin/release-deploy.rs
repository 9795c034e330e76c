use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use release_deploy::pipeline::failure_exit_code;
use release_deploy::preflight::{log_host_info, require_ci, require_curl, require_release_cli};
use release_deploy::version::run_version_script;
use release_deploy::{
    ArtifactScanner, CurlTransfer, DeployArgs, DeployOutcome, Deployer, Logger, RegistryEndpoint,
    ReleaseCli, ResolvedVersion, Uploader,
};

fn main() -> ExitCode {
    let args = DeployArgs::parse();
    let logger = Logger::init(&args.log_config());
    let span = logger.component("main");

    match deploy(&args, &logger) {
        Ok(DeployOutcome::Released {
            assets,
            metadata_path,
        }) => {
            tracing::info!(
                parent: &span,
                "released with {} assets; metadata at {}",
                assets,
                metadata_path.display()
            );
            ExitCode::SUCCESS
        }
        Ok(DeployOutcome::Skipped { assets }) => {
            tracing::info!(parent: &span, "snapshot deploy finished ({} assets)", assets);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(parent: &span, "{:#}", err);
            ExitCode::from(failure_exit_code(&err))
        }
    }
}

fn deploy(args: &DeployArgs, logger: &Logger) -> Result<DeployOutcome> {
    let span = logger.component("preflight");

    require_ci(args.ci.as_deref())?;
    log_host_info(&span);

    // without release-cli the assets would be orphaned, so stop before uploading
    require_release_cli(&args.release_cli)?;
    let ctx = args.ci_context()?;

    tracing::info!(parent: &span, "deriving Graphviz version");
    let release = match &args.release_version {
        Some(v) => v.clone(),
        None => run_version_script(&args.python, &args.version_script, &args.root)
            .context("deriving Graphviz version")?,
    };
    let version = ResolvedVersion::resolve(&release, ctx.commit_sha.as_deref())?;

    if version.is_real_release {
        require_curl(&args.curl)?;
    }

    let mut deployer = Deployer::new(
        ArtifactScanner::new(&args.root, &args.packages_dir, logger),
        Uploader::new(
            RegistryEndpoint::from_ci(&ctx),
            CurlTransfer::new(&args.curl, &ctx.job_token),
            logger,
        ),
        ReleaseCli::new(&args.release_cli, logger),
        logger,
    );
    deployer.run(&version)
}
