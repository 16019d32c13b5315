//! Error types for the lbdevtools core library.
//!
//! Each subsystem has its own error type derived with `thiserror`; the
//! workflow errors wrap the lower-level Git, GitLab and tracking errors.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git operations (git2 and the `git` CLI).
#[derive(Debug, Error)]
pub enum GitError {
    /// The directory is not inside a git working tree.
    #[error("not a git repository: '{0}'")]
    NotAGitRepository(String),

    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("invalid reference: {0}")]
    RefNotFound(String),

    /// The recorded base commit of a tracked path no longer resolves.
    #[error("unknown base commit {base} for '{path}' (stale .git-lb-checkout?)")]
    UnknownBase { path: String, base: String },

    /// A commit could not be replayed onto the synthetic branch.
    #[error("failed to apply commit {commit}: {detail}")]
    PatchConflict { commit: String, detail: String },

    /// The remote refused the final push (non-fast-forward, permissions).
    #[error("push of '{branch}' to '{remote}' rejected: {detail}")]
    RemoteRejected {
        remote: String,
        branch: String,
        detail: String,
    },

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitLab API errors
// ---------------------------------------------------------------------------

/// Errors from GitLab REST API interactions.
#[derive(Debug, Error)]
pub enum GitLabError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitLab HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitLab API error (HTTP {status}) on {endpoint}: {body}")]
    ApiError {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// Token is missing or was refused.
    #[error("GitLab authentication required: {0}")]
    AuthenticationRequired(String),

    /// No milestone carries the requested title.
    #[error("milestone '{milestone}' not found in GitLab project {project}")]
    MilestoneNotFound { milestone: String, project: String },

    /// More than one milestone carries exactly the requested title.
    #[error("{count} milestones titled '{milestone}' found in GitLab project {project}")]
    AmbiguousMilestone {
        milestone: String,
        project: String,
        count: usize,
    },

    /// Not every merge request found in history could be listed.
    #[error("could not list all {expected} merge requests, got {got}")]
    IncompleteListing { expected: usize, got: usize },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tracking file errors
// ---------------------------------------------------------------------------

/// Errors reading or writing the `.git-lb-checkout` bookkeeping file.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// A section lacks a required key.
    #[error("section '{section}' has no '{key}' entry")]
    MissingKey { section: String, key: String },

    /// Underlying git-config parser error.
    #[error("tracking file error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O error.
    #[error("tracking file I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// lb-push errors
// ---------------------------------------------------------------------------

/// Errors from the `lb-push` workflow.
#[derive(Debug, Error)]
pub enum PushError {
    /// No tracked path was recorded for the requested remote.
    #[error("no lb-checkout path found for project {remote}")]
    NoTrackedPaths {
        remote: String,
        known_remotes: Vec<String>,
    },

    /// The path filter excluded every tracked path.
    #[error("no directory selected, check your options")]
    NothingSelected,

    /// Underlying Git error.
    #[error("push Git error: {0}")]
    GitError(#[from] GitError),

    /// Underlying tracking file error.
    #[error("push tracking error: {0}")]
    TrackingError(#[from] TrackingError),
}

// ---------------------------------------------------------------------------
// lb-checkout errors
// ---------------------------------------------------------------------------

/// Errors from the `lb-checkout` workflow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No remote branch or namespaced tag contains the commit.
    #[error("cannot find the remote repository containing {0}")]
    RemoteNotFound(String),

    /// Underlying Git error.
    #[error("checkout Git error: {0}")]
    GitError(#[from] GitError),

    /// Underlying tracking file error.
    #[error("checkout tracking error: {0}")]
    TrackingError(#[from] TrackingError),
}

// ---------------------------------------------------------------------------
// lb-clone-pkg errors
// ---------------------------------------------------------------------------

/// Errors from the `lb-clone-pkg` workflow.
#[derive(Debug, Error)]
pub enum ClonePkgError {
    /// Underlying Git error.
    #[error("clone Git error: {0}")]
    GitError(#[from] GitError),

    /// Creating the package links failed.
    #[error("clone I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Release notes errors
// ---------------------------------------------------------------------------

/// Errors from release notes generation.
#[derive(Debug, Error)]
pub enum ReleaseNotesError {
    /// The GitLab project could not be inferred from `git remote -v`.
    #[error("could not find gitlab project of '{0}' from its origin remote")]
    ProjectNotDetected(String),

    /// Refuse to overwrite an existing draft.
    #[error("output {0} exists, aborting")]
    OutputExists(PathBuf),

    /// The stack description references a project twice.
    #[error("circular dependency detected on {0}")]
    CircularDependency(String),

    /// A project is missing from the stack description.
    #[error("project {0} not described in stack")]
    UnknownStackProject(String),

    /// Neither command line nor stack gave a version.
    #[error("{0} version not set")]
    MissingVersion(String),

    /// Malformed stack description.
    #[error("stack parse error: {0}")]
    StackParse(#[from] serde_json::Error),

    /// Underlying Git error.
    #[error("release notes Git error: {0}")]
    GitError(#[from] GitError),

    /// Underlying GitLab error.
    #[error("release notes GitLab error: {0}")]
    GitLabError(#[from] GitLabError),

    /// Generic I/O error.
    #[error("release notes I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
