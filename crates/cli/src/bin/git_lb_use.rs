//! `git lb-use`: add a project repository as a remote.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use lbdevtools_cli::{exit_code, init_logging, ConfigArgs, Verbosity};
use lbdevtools_core::git::protocol::Protocol;
use lbdevtools_core::remote_use::{default_protocol, lb_use};
use lbdevtools_core::GitClient;

/// Define a remote for a project repository and fetch its branches and tags.
#[derive(Parser, Debug)]
#[command(name = "git lb-use", version)]
struct Cli {
    /// Project whose history to fetch.
    project: String,

    /// Alternative repository to use instead of the standard one.
    #[arg(value_name = "repository_url")]
    url: Option<String>,

    /// Protocol used to connect to GitLab (default: git config
    /// lb-use.protocol, then the tool configuration, then krb5).
    #[arg(short, long)]
    protocol: Option<Protocol>,

    #[command(flatten)]
    config: ConfigArgs,

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
    let config = cli.config.load()?;

    let protocol = match cli.protocol {
        Some(p) => p,
        None => default_protocol(&git, config.git.protocol)?,
    };
    lb_use(&git, &cli.project, cli.url.as_deref(), protocol)
        .await
        .with_context(|| format!("failed to set up remote {}", cli.project))?;
    Ok(())
}
