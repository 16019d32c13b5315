//! Classification of local commits by the tracked directories they touch.
//!
//! For every tracked path the commits since its `base` are listed oldest
//! first; the first one *introduces* the path. The per-path lists are then
//! merged into a single replay order that respects commit ancestry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, instrument};

use crate::errors::GitError;
use crate::git::GitClient;

/// How one commit relates to the tracked paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitClassification {
    pub commit: String,
    /// Tracked paths modified by the commit.
    pub touched: BTreeSet<String>,
    /// Subset of `touched` for which this is the first commit since `base`.
    pub introduced: BTreeSet<String>,
}

impl CommitClassification {
    /// Touched paths that were already introduced by an earlier commit.
    pub fn patched(&self) -> impl Iterator<Item = &String> + '_ {
        self.touched.difference(&self.introduced)
    }
}

/// The commits touching one path, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHistory {
    pub path: String,
    pub commits: Vec<String>,
}

/// Folds per-path histories into classification records.
#[derive(Debug, Default)]
pub struct ClassificationBuilder {
    touches: HashMap<String, (BTreeSet<String>, BTreeSet<String>)>,
}

impl ClassificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path history; its first commit introduces the path.
    pub fn add(mut self, history: &PathHistory) -> Self {
        for (idx, commit) in history.commits.iter().enumerate() {
            let (touched, introduced) = self.touches.entry(commit.clone()).or_default();
            touched.insert(history.path.clone());
            if idx == 0 {
                introduced.insert(history.path.clone());
            }
        }
        self
    }

    /// Emit one record per commit, following `order`.
    pub fn build(mut self, order: &[String]) -> Vec<CommitClassification> {
        order
            .iter()
            .filter_map(|commit| {
                self.touches
                    .remove(commit)
                    .map(|(touched, introduced)| CommitClassification {
                        commit: commit.clone(),
                        touched,
                        introduced,
                    })
            })
            .collect()
    }
}

/// Merge chronologically sorted sequences into one sequence where a commit
/// never follows one of its descendants.
///
/// `is_ancestor(a, b)` must answer whether `a` is a strict ancestor of `b`.
/// Ancestry is only a partial order, so sequences are merged pairwise like
/// the merge step of a merge sort: an element of the incoming sequence is
/// taken first only when it is an ancestor of the accumulated head;
/// incomparable pairs keep their input order. Commits present in several
/// sequences are emitted once.
pub fn merge_by_ancestry<E, F>(sequences: &[Vec<String>], mut is_ancestor: F) -> Result<Vec<String>, E>
where
    F: FnMut(&str, &str) -> Result<bool, E>,
{
    let mut merged: Vec<String> = Vec::new();
    for incoming in sequences {
        let mut result = Vec::with_capacity(merged.len() + incoming.len());
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let (mut i, mut j) = (0, 0);
        while i < merged.len() && j < incoming.len() {
            let (acc, inc) = (&merged[i], &incoming[j]);
            if acc == inc {
                result.push(acc.clone());
                i += 1;
                j += 1;
            } else if merged[i..].contains(inc) {
                // Shared commit further ahead: keep accumulated order up to it.
                result.push(acc.clone());
                i += 1;
            } else if is_ancestor(inc, acc)? {
                result.push(inc.clone());
                j += 1;
            } else {
                result.push(acc.clone());
                i += 1;
            }
        }
        result.extend(merged[i..].iter().cloned());
        result.extend(incoming[j..].iter().cloned());
        // Guard against duplicates inside a single input sequence.
        let deduped: Vec<String> = result
            .iter()
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect();
        merged = deduped;
    }
    Ok(merged)
}

/// Walks local history for the tracked paths.
pub struct HistoryScanner<'a> {
    git: &'a GitClient,
}

impl<'a> HistoryScanner<'a> {
    pub fn new(git: &'a GitClient) -> Self {
        Self { git }
    }

    /// Classify commits since each path's base, in replay order.
    ///
    /// Paths without new commits do not appear in the result; an empty
    /// result means there is nothing to replay.
    #[instrument(skip(self, bases))]
    pub async fn scan(
        &self,
        bases: &BTreeMap<String, String>,
    ) -> Result<Vec<CommitClassification>, GitError> {
        let mut histories = Vec::with_capacity(bases.len());
        for (path, base) in bases {
            let base_sha = self
                .git
                .resolve_commit(base)
                .map_err(|_| GitError::UnknownBase {
                    path: path.clone(),
                    base: base.clone(),
                })?;
            let commits = self.git.log_path(&base_sha, path).await?;
            if commits.is_empty() {
                debug!(path = %path, "no commits since base");
                continue;
            }
            debug!(path = %path, count = commits.len(), "commits since base");
            histories.push(PathHistory {
                path: path.clone(),
                commits,
            });
        }

        let sequences: Vec<Vec<String>> = histories.iter().map(|h| h.commits.clone()).collect();
        let order = merge_by_ancestry(&sequences, |a, b| self.git.is_ancestor(a, b))?;

        let builder = histories
            .iter()
            .fold(ClassificationBuilder::new(), |builder, history| builder.add(history));
        let classified = builder.build(&order);
        info!(commits = classified.len(), "classified commits");
        Ok(classified)
    }
}
