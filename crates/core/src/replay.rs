//! Construction of the synthetic branch replayed onto an upstream project.
//!
//! The branch is built in a throw-away clone of the local repository that
//! borrows its object store. Introduced paths are grafted from the upstream
//! commit they were imported from; later changes are carried over as
//! `format-patch | am` so that authorship and messages are preserved.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;
use crate::git::GitClient;
use crate::history::CommitClassification;

/// Identity keys copied from the local repository into the scratch clone.
const IDENTITY_KEYS: [&str; 2] = ["user.name", "user.email"];

/// First name, among `branch`, `branch-tmp1`, `branch-tmp2`, ..., that is
/// not an existing local branch.
pub fn temp_branch_name(branch: &str, existing: &[String]) -> String {
    let mut candidate = branch.to_string();
    let mut count = 1;
    while existing.iter().any(|b| b == &candidate) {
        candidate = format!("{}-tmp{}", branch, count);
        count += 1;
    }
    candidate
}

/// A scratch clone in which the synthetic branch is assembled.
pub struct PatchReplayer {
    scratch: GitClient,
    dir: Option<TempDir>,
    branch: String,
    created: bool,
}

impl PatchReplayer {
    /// Clone `local` into a fresh temporary directory, named after `remote`.
    #[instrument(skip(local))]
    pub async fn prepare(local: &GitClient, remote: &str, branch: &str) -> Result<Self, GitError> {
        let dir = tempfile::Builder::new().prefix("lb-push-").tempdir()?;
        let scratch = local.clone_reference(&dir.path().join(remote)).await?;

        for key in IDENTITY_KEYS {
            if let Some(value) = local.config_string(key)? {
                scratch.run(&["config", key, &value]).await?;
            }
        }

        Ok(Self {
            scratch,
            dir: Some(dir),
            branch: branch.to_string(),
            created: false,
        })
    }

    /// Replay `commits` in order. `imported` maps every introduced path to
    /// the upstream commit it was imported from.
    pub async fn replay(
        &mut self,
        commits: &[CommitClassification],
        imported: &BTreeMap<String, String>,
    ) -> Result<(), GitError> {
        for classification in commits {
            info!(commit = %classification.commit, "applying commit");
            self.replay_one(classification, imported)
                .await
                .map_err(|e| match e {
                    GitError::PatchConflict { .. } => e,
                    other => GitError::PatchConflict {
                        commit: classification.commit.clone(),
                        detail: other.to_string(),
                    },
                })?;
        }
        Ok(())
    }

    async fn replay_one(
        &mut self,
        classification: &CommitClassification,
        imported: &BTreeMap<String, String>,
    ) -> Result<(), GitError> {
        let commit = classification.commit.as_str();

        if !classification.introduced.is_empty() {
            debug!(commit, dirs = ?classification.introduced, "first commit for dirs");
        }
        for path in &classification.introduced {
            let upstream = imported.get(path).ok_or_else(|| GitError::PatchConflict {
                commit: commit.to_string(),
                detail: format!("no imported commit recorded for '{}'", path),
            })?;
            self.graft(commit, path, upstream).await?;
        }

        let patched: Vec<&str> = classification.patched().map(String::as_str).collect();
        if !patched.is_empty() {
            self.apply_patch(commit, &patched).await?;
        }
        Ok(())
    }

    /// Bring in `path` as it is in `commit`, on top of its upstream state.
    async fn graft(&mut self, commit: &str, path: &str, upstream: &str) -> Result<(), GitError> {
        if self.created {
            self.scratch
                .run(&["merge", "--quiet", "--no-edit", upstream])
                .await?;
        } else {
            self.scratch
                .run(&["checkout", "--quiet", "--force", "-b", &self.branch, upstream])
                .await?;
            self.created = true;
            debug!(branch = %self.branch, upstream, "created temporary branch");
        }

        self.scratch
            .run(&["rm", "-r", "--quiet", "--ignore-unmatch", "--", path])
            .await?;
        self.scratch
            .run(&["checkout", "--quiet", commit, "--", path])
            .await?;

        if self.scratch.has_staged_changes().await? {
            self.scratch
                .run(&["commit", "--quiet", "--no-verify", "-C", commit])
                .await?;
            debug!(commit, path, "committed local state of introduced dir");
        }
        Ok(())
    }

    /// `format-patch` the changes of `commit` restricted to `paths` and `am` them.
    async fn apply_patch(&mut self, commit: &str, paths: &[&str]) -> Result<(), GitError> {
        if !self.created {
            return Err(GitError::PatchConflict {
                commit: commit.to_string(),
                detail: "patch precedes any introduced directory".into(),
            });
        }

        // A single commit: merges produce no patch and are skipped below.
        let mut args = vec!["format-patch", "-1", "--stdout", commit, "--"];
        args.extend_from_slice(paths);
        let patch = self.scratch.run(&args).await?;
        if patch.trim().is_empty() {
            debug!(commit, "empty patch (merge commit?), skipping");
            return Ok(());
        }

        if let Err(e) = self
            .scratch
            .run_with_input(&["am", "--quiet"], patch.as_bytes())
            .await
        {
            if let Err(abort) = self.scratch.run(&["am", "--abort"]).await {
                debug!(error = %abort, "git am --abort failed");
            }
            let detail = match e {
                GitError::CommandFailed { stderr, .. } => stderr.trim().to_string(),
                other => other.to_string(),
            };
            return Err(GitError::PatchConflict {
                commit: commit.to_string(),
                detail,
            });
        }
        Ok(())
    }

    /// Push the synthetic branch back into the local repository.
    pub async fn publish(&self) -> Result<(), GitError> {
        if !self.created {
            return Err(GitError::RefNotFound(self.branch.clone()));
        }
        self.scratch.push("origin", &self.branch).await
    }

    /// Leave the scratch clone on disk and return its location.
    pub fn retain(mut self) -> Option<PathBuf> {
        let dir = self.dir.take()?;
        let path = dir.into_path();
        warn!(path = %path.display(), "keeping scratch clone for inspection");
        Some(path)
    }
}
