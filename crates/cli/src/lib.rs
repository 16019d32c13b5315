//! Plumbing shared by the lbdevtools command-line tools.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use lbdevtools_core::config::ToolsConfig;

/// `-q`, `-v` and `-d` flags. The last one given wins.
#[derive(Args, Debug, Clone, Default)]
pub struct Verbosity {
    /// Be more quiet.
    #[arg(short, long, global = true, overrides_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Be more verbose.
    #[arg(short, long, global = true, overrides_with_all = ["quiet", "debug"])]
    pub verbose: bool,

    /// Be very verbose.
    #[arg(short, long, global = true, overrides_with_all = ["quiet", "verbose"])]
    pub debug: bool,
}

impl Verbosity {
    pub fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else if self.verbose {
            LevelFilter::INFO
        } else if self.quiet {
            LevelFilter::ERROR
        } else {
            LevelFilter::WARN
        }
    }
}

/// Options locating the tool configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file (default: $LBDEVTOOLS_CONFIG,
    /// then the user configuration directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<ToolsConfig> {
        ToolsConfig::load_and_resolve(self.config.as_deref())
            .context("failed to load configuration")
    }
}

/// Install the log subscriber. `RUST_LOG` takes precedence over the flags.
pub fn init_logging(verbosity: &Verbosity) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.level().into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Map the outcome of a command to the process exit code, logging errors.
pub fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
