//! `git lb-push`: send local changes of imported directories upstream.
//!
//! A push runs through a small state machine:
//!
//! 1. **Collecting**: select the tracked paths and classify the commits
//!    touching them since their recorded base.
//! 2. **Replaying**: build the synthetic branch in a scratch clone.
//! 3. **PushingTemp**: push the branch back into the local repository.
//! 4. **PushingFinal**: push it from the local repository to the remote.
//!
//! It ends in `Done` or `Failed`. On success the tracking file is updated
//! and committed on its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{GitError, PushError};
use crate::git::GitClient;
use crate::history::HistoryScanner;
use crate::replay::{temp_branch_name, PatchReplayer};
use crate::tracking::{is_subdir, TrackedPath, TrackingFile, TRACKING_FILE};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// States of a push.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PushState {
    Collecting,
    Replaying,
    PushingTemp,
    PushingFinal,
    Done,
    Failed,
}

impl PushState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: PushState) -> bool {
        use PushState::*;
        matches!(
            (self, next),
            (Collecting, Replaying)
                | (Collecting, Done)
                | (Collecting, Failed)
                | (Replaying, PushingTemp)
                | (Replaying, Failed)
                | (PushingTemp, PushingFinal)
                | (PushingTemp, Failed)
                | (PushingFinal, Done)
                | (PushingFinal, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PushState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collecting => write!(f, "collecting"),
            Self::Replaying => write!(f, "replaying"),
            Self::PushingTemp => write!(f, "pushing_temp"),
            Self::PushingFinal => write!(f, "pushing_final"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// What to push, and where.
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub remote: String,
    pub branch: String,
    /// Repository-relative paths restricting the tracked directories; empty
    /// means every directory tracked for `remote`.
    pub paths: Vec<String>,
    pub keep_temp_branch: bool,
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No local commit touches the selected directories.
    UpToDate,
    Pushed {
        temp_branch: String,
        /// New `base` of every pushed directory.
        base: String,
        /// New `imported` of every pushed directory.
        imported: String,
        paths: Vec<String>,
    },
}

/// Tracked directories of `remote` selected by `filters`.
///
/// A directory is selected when it lies below one of the filters; no filter
/// selects everything.
pub fn select_paths(
    tracked: &[TrackedPath],
    remote: &str,
    filters: &[String],
) -> Result<BTreeMap<String, TrackedPath>, PushError> {
    let for_remote: Vec<&TrackedPath> = tracked.iter().filter(|t| t.remote == remote).collect();
    if for_remote.is_empty() {
        let mut known_remotes: Vec<String> = tracked.iter().map(|t| t.remote.clone()).collect();
        known_remotes.sort();
        known_remotes.dedup();
        return Err(PushError::NoTrackedPaths {
            remote: remote.to_string(),
            known_remotes,
        });
    }

    let selected: BTreeMap<String, TrackedPath> = for_remote
        .into_iter()
        .filter(|t| filters.is_empty() || filters.iter().any(|f| is_subdir(&t.path, f)))
        .map(|t| (t.path.clone(), t.clone()))
        .collect();
    if selected.is_empty() {
        return Err(PushError::NothingSelected);
    }
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Drives one `lb-push` run against a local repository.
pub struct LbPush<'a> {
    git: &'a GitClient,
    tracking: TrackingFile,
    state: PushState,
    kept_scratch: Option<PathBuf>,
}

impl<'a> LbPush<'a> {
    pub fn new(git: &'a GitClient) -> Self {
        Self {
            git,
            tracking: TrackingFile::in_worktree(git.workdir()),
            state: PushState::Collecting,
            kept_scratch: None,
        }
    }

    /// Current state of the machine.
    pub fn state(&self) -> PushState {
        self.state
    }

    /// Scratch clone left on disk by a failed run with `keep_temp_branch`.
    pub fn kept_scratch_clone(&self) -> Option<&Path> {
        self.kept_scratch.as_deref()
    }

    fn transition(&mut self, next: PushState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid push transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "push state change");
        self.state = next;
    }

    /// Execute the push described by `request`.
    #[instrument(skip(self, request), fields(remote = %request.remote, branch = %request.branch))]
    pub async fn run(&mut self, request: &PushRequest) -> Result<PushOutcome, PushError> {
        let result = self.do_push(request).await;
        match &result {
            Ok(_) => self.transition(PushState::Done),
            Err(e) => {
                debug!(state = %self.state, error = %e, "push failed");
                if !self.state.is_terminal() {
                    self.transition(PushState::Failed);
                }
            }
        }
        result
    }

    async fn do_push(&mut self, request: &PushRequest) -> Result<PushOutcome, PushError> {
        info!(workdir = %self.git.workdir().display(), "using repository");

        let tracked = self.tracking.entries()?;
        let selected = match select_paths(&tracked, &request.remote, &request.paths) {
            Err(PushError::NoTrackedPaths {
                remote,
                known_remotes,
            }) => {
                if known_remotes.is_empty() {
                    warn!("no lb-checkouts made");
                } else {
                    warn!("possible projects are: {}", known_remotes.join(", "));
                }
                return Err(PushError::NoTrackedPaths {
                    remote,
                    known_remotes,
                });
            }
            other => other?,
        };
        let paths: Vec<String> = selected.keys().cloned().collect();
        info!(dirs = ?paths, "considering directories");

        let bases: BTreeMap<String, String> = selected
            .iter()
            .map(|(path, t)| (path.clone(), t.base.clone()))
            .collect();
        let commits = HistoryScanner::new(self.git).scan(&bases).await?;
        if commits.is_empty() {
            warn!("nothing to push");
            return Ok(PushOutcome::UpToDate);
        }

        let temp_branch = temp_branch_name(&request.branch, &self.git.list_branches()?);
        if temp_branch != request.branch {
            info!(temp_branch = %temp_branch, "using temporary branch name");
        }

        self.transition(PushState::Replaying);
        let imported: BTreeMap<String, String> = selected
            .iter()
            .map(|(path, t)| (path.clone(), t.imported.clone()))
            .collect();
        let mut replayer = PatchReplayer::prepare(self.git, &request.remote, &temp_branch).await?;
        if let Err(e) = replayer.replay(&commits, &imported).await {
            if request.keep_temp_branch {
                self.kept_scratch = replayer.retain();
            }
            return Err(e.into());
        }

        self.transition(PushState::PushingTemp);
        let published = replayer.publish().await;
        if published.is_err() && request.keep_temp_branch {
            self.kept_scratch = replayer.retain();
        } else {
            drop(replayer);
        }
        published?;

        self.transition(PushState::PushingFinal);
        let result = self.finish(request, &temp_branch, &paths).await;

        if request.keep_temp_branch {
            warn!(
                "keeping branch {}, it is up to you to delete it",
                temp_branch
            );
        } else if let Err(e) = self.git.delete_branch(&temp_branch).await {
            warn!(branch = %temp_branch, error = %e, "failed to delete temporary branch");
        }
        result
    }

    async fn finish(
        &mut self,
        request: &PushRequest,
        temp_branch: &str,
        paths: &[String],
    ) -> Result<PushOutcome, PushError> {
        let refspec = format!("{}:{}", temp_branch, request.branch);
        if let Err(e) = self.git.push(&request.remote, &refspec).await {
            if request.keep_temp_branch {
                error!("keeping temporary branch {}", temp_branch);
            } else {
                warn!("for inspection with vanilla git (e.g. --force) use");
                warn!(" git lb-push --keep-temp-branch ...");
            }
            info!(
                "possible reasons are: no push permission or branch with the same name \
                 exists and cannot be fast-forwarded"
            );
            return Err(e.into());
        }

        let base = self.git.head_sha()?;
        let imported = self.git.resolve_commit(temp_branch)?;
        for path in paths {
            self.tracking
                .record(&request.remote, path, &base, &imported)?;
        }
        self.commit_tracking_file(&request.remote, &request.branch)
            .await?;
        info!(base = %base, imported = %imported, "updated tracking information");

        Ok(PushOutcome::Pushed {
            temp_branch: temp_branch.to_string(),
            base,
            imported,
            paths: paths.to_vec(),
        })
    }

    async fn commit_tracking_file(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        let message = format!(
            "updated {} after push of {}/{}",
            TRACKING_FILE, remote, branch
        );
        self.git.run(&["add", "--", TRACKING_FILE]).await?;
        self.git
            .run(&["commit", "--quiet", "--no-verify", "-m", &message, "--", TRACKING_FILE])
            .await?;
        Ok(())
    }
}
