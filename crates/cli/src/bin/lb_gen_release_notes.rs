//! `lb-gen-release-notes`: draft release notes from git history and GitLab.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::warn;

use lbdevtools_cli::{exit_code, init_logging, ConfigArgs, Verbosity};
use lbdevtools_core::release::{generate, ReleaseNotesRequest};
use lbdevtools_core::GitLabClient;

const AFTER_HELP: &str = "\
Example:
  Change directory to a full project clone, checkout the release branch
  and call lb-gen-release-notes:

    $ git clone https://:@gitlab.cern.ch:8443/lhcb/Hlt.git
    $ cd Hlt
    $ git checkout -b v27r0-release master
    $ lb-gen-release-notes v26r6 v27r0

  The draft is written under ReleaseNotes/ by default.";

/// Generate a release notes draft.
#[derive(Parser, Debug)]
#[command(name = "lb-gen-release-notes", version, after_help = AFTER_HELP)]
struct Cli {
    /// Previous (base) release.
    previous: Option<String>,

    /// Target release.
    target: Option<String>,

    /// Path to the JSON file defining the stack versions.
    #[arg(short, long)]
    stack: Option<PathBuf>,

    /// Output file ({repo} and {target} are substituted).
    #[arg(short, long)]
    output: Option<String>,

    /// Path to the git repository.
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    /// GitLab access token (defaults to the configured environment variable).
    #[arg(long)]
    token: Option<String>,

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
    if cli.stack.is_none() && (cli.previous.is_none() || cli.target.is_none()) {
        bail!("both previous and target versions need to be given");
    }

    let mut config = cli.config.load()?;
    if let Some(token) = cli.token {
        config.gitlab.token = Some(token);
    }
    if config.gitlab.token.is_none() {
        warn!(
            "querying GitLab without token will disable some features; \
             either set ${} or use --token",
            config.gitlab.token_env
        );
    }
    let gitlab = GitLabClient::from_config(&config.gitlab).context("failed to create GitLab client")?;

    let request = ReleaseNotesRequest {
        repo: cli.repo,
        previous: cli.previous,
        target: cli.target,
        stack: cli.stack,
        output: cli.output,
        date: chrono::Local::now().date_naive(),
    };
    let generated = generate(&request, &config, &gitlab)
        .await
        .context("failed to generate release notes")?;
    println!("Release notes draft written to {}.", generated.path.display());
    if !generated.warnings.is_empty() {
        println!("{} warning(s) need attention, see above.", generated.warnings.len());
    }
    Ok(())
}
