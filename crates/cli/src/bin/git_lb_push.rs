//! `git lb-push`: push local changes of imported directories to their project.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lbdevtools_cli::{exit_code, init_logging, Verbosity};
use lbdevtools_core::{GitClient, LbPush, PushOutcome, PushRequest};

/// Push the changes made to directories imported with `git lb-checkout` to a
/// branch of their upstream project.
#[derive(Parser, Debug)]
#[command(name = "git lb-push", version)]
struct Cli {
    /// Remote (project) the directories were imported from.
    remote: String,

    /// Branch to create or update on the remote.
    branch: String,

    /// Only push tracked directories below these paths.
    #[arg(value_name = "path")]
    paths: Vec<String>,

    /// Keep the temporary branch after the push instead of deleting it.
    #[arg(short, long = "keep-temp-branch")]
    keep_temp_branch: bool,

    #[command(flatten)]
    verbosity: Verbosity,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);
    exit_code(run(cli).await)
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let git = GitClient::discover(&cwd).context("current directory is not a Git repository")?;

    let request = PushRequest {
        remote: cli.remote,
        branch: cli.branch,
        paths: cli
            .paths
            .iter()
            .map(|p| git.relative_path(&cwd, p))
            .collect(),
        keep_temp_branch: cli.keep_temp_branch,
    };

    let mut push = LbPush::new(&git);
    match push
        .run(&request)
        .await
        .with_context(|| format!("failed to push to {}", request.remote))?
    {
        PushOutcome::UpToDate => {}
        PushOutcome::Pushed { paths, .. } => {
            info!(
                "pushed {} to {}/{}",
                paths.join(", "),
                request.remote,
                request.branch
            );
        }
    }
    Ok(())
}
