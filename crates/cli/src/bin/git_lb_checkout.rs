//! `git lb-checkout`: import a directory from another project.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use lbdevtools_cli::{exit_code, init_logging, Verbosity};
use lbdevtools_core::checkout::{lb_checkout, CheckoutRequest};
use lbdevtools_core::errors::{CheckoutError, GitError};
use lbdevtools_core::GitClient;

/// Check out a directory from a branch, tag or commit of another project and
/// keep track of it for `git lb-push`.
#[derive(Parser, Debug)]
#[command(name = "git lb-checkout", version)]
struct Cli {
    /// Branch, tag or commit to get the directory from (e.g. LHCb/master).
    #[arg(value_name = "branch")]
    commitish: String,

    /// File or directory to check out.
    path: String,

    /// Commit immediately after checkout (default).
    #[arg(short = 'c', long = "commit", overrides_with = "no_commit")]
    commit: bool,

    /// Do not commit after checkout.
    #[arg(long = "no-commit", overrides_with = "commit")]
    no_commit: bool,

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

    let request = CheckoutRequest {
        commitish: cli.commitish,
        path: git.relative_path(&cwd, cli.path.trim_end_matches('/')),
        commit: cli.commit || !cli.no_commit,
    };

    match lb_checkout(&git, &request).await {
        Err(CheckoutError::GitError(e @ GitError::RefNotFound(_))) => {
            error!("did you forget to call 'git lb-use'?");
            Err(e.into())
        }
        other => other.map(|_| ()).map_err(Into::into),
    }
}
