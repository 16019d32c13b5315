//! `git lb-clone-pkg`: clone a data package.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use lbdevtools_cli::{exit_code, init_logging, ConfigArgs, Verbosity};
use lbdevtools_core::clone_pkg::{configured_protocol, lb_clone_pkg, ClonePkgRequest};

/// Wrapper around "git clone" to get data packages.
#[derive(Parser, Debug)]
#[command(name = "git lb-clone-pkg", version)]
struct Cli {
    /// Optional git URL to use, followed by the name of the data package.
    #[arg(value_name = "[url] name", num_args = 1..=2, required = true)]
    positional: Vec<String>,

    /// Use NAME instead of 'origin' to track upstream.
    #[arg(short, long, value_name = "NAME")]
    origin: Option<String>,

    /// Checkout BRANCH instead of the remote's HEAD.
    #[arg(short, long)]
    branch: Option<String>,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    verbosity: Verbosity,
}

impl Cli {
    /// Split the positionals into the optional URL and the package name.
    fn url_and_name(&self) -> (Option<String>, String) {
        match self.positional.as_slice() {
            [url, name] => (Some(url.clone()), name.clone()),
            [name] => (None, name.clone()),
            _ => (None, String::new()),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);
    exit_code(run(cli).await)
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let config = cli.config.load()?;
    let (url, name) = cli.url_and_name();

    let protocol = configured_protocol(&cwd, config.git.protocol)?;
    let request = ClonePkgRequest {
        name,
        url,
        protocol,
        origin: cli.origin,
        branch: cli.branch,
        verbose: cli.verbosity.verbose || cli.verbosity.debug,
    };
    let package = lb_clone_pkg(&cwd, &request)
        .await
        .with_context(|| format!("failed to clone data package {}", request.name))?;
    tracing::info!(
        "{} ready, version aliases: {}",
        package.path.display(),
        package.aliases.join(", ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positionals() {
        let cli = Cli::parse_from(["git-lb-clone-pkg", "PRConfig"]);
        assert_eq!(cli.url_and_name(), (None, "PRConfig".to_string()));

        let cli = Cli::parse_from([
            "git-lb-clone-pkg",
            "-o",
            "upstream",
            "/srv/git/PRConfig.git",
            "PRConfig",
        ]);
        assert_eq!(
            cli.url_and_name(),
            (Some("/srv/git/PRConfig.git".to_string()), "PRConfig".to_string())
        );
        assert_eq!(cli.origin.as_deref(), Some("upstream"));

        assert!(Cli::try_parse_from(["git-lb-clone-pkg"]).is_err());
        assert!(Cli::try_parse_from(["git-lb-clone-pkg", "a", "b", "c"]).is_err());
    }
}
