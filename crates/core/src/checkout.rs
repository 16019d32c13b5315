//! `git lb-checkout`: import a directory from another project's branch.

use std::fs::OpenOptions;
use std::time::SystemTime;

use tracing::{debug, info, instrument, warn};

use crate::errors::{CheckoutError, GitError};
use crate::git::GitClient;
use crate::tracking::{TrackingFile, TRACKING_FILE};

/// Options of a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Branch, tag or commit to take the directory from (e.g. `LHCb/master`).
    pub commitish: String,
    /// Repository-relative path of the directory.
    pub path: String,
    /// Commit the import right away.
    pub commit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The worktree already matched the requested state.
    Unchanged,
    Imported {
        remote: String,
        imported: String,
        committed: bool,
    },
}

/// Remote name from the first line of `git branch -r` or `git tag` output
/// that is qualified by a remote (`<remote>/<name>`).
fn first_remote_prefix(listing: &str) -> Option<String> {
    listing
        .lines()
        .map(str::trim)
        .filter_map(|line| line.split_once('/'))
        .map(|(remote, _)| remote.to_string())
        .find(|remote| !remote.is_empty())
}

/// Remote owning `commitish`: its `<remote>/` prefix if present, else the
/// first remote branch or namespaced tag containing it.
pub async fn find_remote(git: &GitClient, commitish: &str) -> Result<String, CheckoutError> {
    if let Some((remote, _)) = commitish.split_once('/') {
        return Ok(remote.to_string());
    }

    let branches = git.run(&["branch", "-r", "--contains", commitish]).await?;
    if let Some(remote) = first_remote_prefix(&branches) {
        return Ok(remote);
    }
    let tags = git.run(&["tag", "--contains", commitish]).await?;
    first_remote_prefix(&tags).ok_or_else(|| CheckoutError::RemoteNotFound(commitish.to_string()))
}

/// Check out `request.path` from `request.commitish` and record it as tracked.
#[instrument(skip(git))]
pub async fn lb_checkout(
    git: &GitClient,
    request: &CheckoutRequest,
) -> Result<CheckoutOutcome, CheckoutError> {
    let imported = git.resolve_commit(&request.commitish)?;
    let remote = find_remote(git, &request.commitish).await?;
    let path = request.path.trim_end_matches('/');

    git.run(&["checkout", &request.commitish, "--", path]).await?;

    let tracking = TrackingFile::in_worktree(git.workdir());
    let base = git.head_sha()?;
    tracking.record(&remote, path, &base, &imported)?;
    git.run(&["add", "--", TRACKING_FILE]).await?;

    if !git.has_staged_changes().await? {
        warn!("no change");
        return Ok(CheckoutOutcome::Unchanged);
    }

    if request.commit {
        let message = format!("added {} from {} ({})", path, remote, request.commitish);
        git.run(&["commit", "--quiet", "-m", &message]).await?;
    }
    info!(path, remote = %remote, commitish = %request.commitish, "checked out");
    if let Ok(changes) = git
        .run(&["diff", "--name-status", &base, "--", path])
        .await
    {
        for line in changes.lines() {
            debug!(" {}", line);
        }
    }

    touch_top_cmakelists(git)?;

    Ok(CheckoutOutcome::Imported {
        remote,
        imported,
        committed: request.commit,
    })
}

/// Bump the modification time of the top-level `CMakeLists.txt`, if any, so
/// that the build picks up the new directory.
fn touch_top_cmakelists(git: &GitClient) -> Result<(), GitError> {
    let cmakelists = git.workdir().join("CMakeLists.txt");
    if cmakelists.exists() {
        let file = OpenOptions::new().append(true).open(&cmakelists)?;
        file.set_modified(SystemTime::now())?;
    }
    Ok(())
}
