//! Release notes drafts built from git history and GitLab milestones.
//!
//! - [`reconcile`]: merge requests in history vs. merge requests in a milestone.
//! - [`stack`]: versions and dependencies of the projects in a release stack.
//! - [`notes`]: Markdown rendering.

pub mod notes;
pub mod reconcile;
pub mod stack;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::ToolsConfig;
use crate::errors::ReleaseNotesError;
use crate::git::GitClient;
use crate::gitlab::GitLabClient;

use notes::{output_path, write_notes, ReleaseNotes};
use reconcile::{MergeRequestRecord, MrReconciler};
use stack::{dependency_line, Stack, StackEntry};

/// Inputs of `lb-gen-release-notes`.
#[derive(Debug, Clone)]
pub struct ReleaseNotesRequest {
    /// Clone of the project the notes are for.
    pub repo: PathBuf,
    /// Version the notes are relative to; taken from the stack if absent.
    pub previous: Option<String>,
    /// Version being released; taken from the stack if absent.
    pub target: Option<String>,
    /// Stack description, next to sibling clones of the dependencies.
    pub stack: Option<PathBuf>,
    /// Output path pattern overriding the configured one.
    pub output: Option<String>,
    pub date: NaiveDate,
}

/// Where the draft went and what needs a human look.
#[derive(Debug, Clone)]
pub struct GeneratedNotes {
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

fn pick_version(
    given: Option<&String>,
    from_stack: Option<&String>,
    what: &str,
) -> Result<String, ReleaseNotesError> {
    given
        .or(from_stack)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ReleaseNotesError::MissingVersion(what.to_string()))
}

/// Produce the release notes draft described by `request`.
pub async fn generate(
    request: &ReleaseNotesRequest,
    config: &ToolsConfig,
    gitlab: &GitLabClient,
) -> Result<GeneratedNotes, ReleaseNotesError> {
    let git = GitClient::open(&request.repo)?;
    let host = config.gitlab.host().to_string();
    let reconciler = MrReconciler::new(&git, gitlab, host.clone());
    let project_fullname = reconciler.project_fullname()?;
    let project = project_fullname
        .rsplit('/')
        .next()
        .unwrap_or(&project_fullname)
        .to_string();
    info!(project = %project_fullname, "generating release notes");

    let stack = request.stack.as_deref().map(Stack::load).transpose()?;
    let own_entry: Option<&StackEntry> = match &stack {
        Some(stack) => Some(
            stack
                .get(&project)
                .ok_or_else(|| ReleaseNotesError::UnknownStackProject(project.clone()))?,
        ),
        None => None,
    };
    let dependencies = match &stack {
        Some(stack) => stack.dependencies(&project)?,
        None => Vec::new(),
    };

    let previous = pick_version(
        request.previous.as_ref(),
        own_entry.map(|e| &e.previous),
        "previous",
    )?;
    let target = pick_version(
        request.target.as_ref(),
        own_entry.map(|e| &e.target),
        "target",
    )?;

    let pattern = request
        .output
        .as_deref()
        .unwrap_or(&config.release_notes.output);
    let path = output_path(pattern, &request.repo, &target);
    if path.exists() {
        return Err(ReleaseNotesError::OutputExists(path));
    }

    let reconciliation = reconciler.find_merge_requests(&previous, &target).await?;
    let mut warnings = reconciliation.warnings;

    let stack_dir = request
        .stack
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut highlights: Vec<MergeRequestRecord> = Vec::new();
    for (name, entry) in &dependencies {
        if !entry.changed() {
            continue;
        }
        let sibling = stack_dir.join(name);
        debug!(dependency = %name, repo = %sibling.display(), "looking for upstream highlights");
        let sibling_git = GitClient::open(&sibling)?;
        let upstream = MrReconciler::new(&sibling_git, gitlab, host.clone())
            .find_merge_requests(&entry.previous, &entry.target)
            .await?;
        warnings.extend(upstream.warnings);
        highlights.extend(
            upstream
                .merge_requests
                .into_iter()
                .filter(|mr| mr.has_label(&config.release_notes.highlight_label)),
        );
    }

    let draft = ReleaseNotes {
        date: request.date,
        project,
        project_fullname: project_fullname.clone(),
        previous,
        version: target,
        dependencies: dependencies
            .iter()
            .map(|(name, entry)| dependency_line(name, &entry.target, &project_fullname))
            .collect(),
        merge_requests: reconciliation.merge_requests,
        highlights,
    };
    if draft.merge_requests.is_empty() {
        warn!("no merge requests to report");
    }

    write_notes(&path, &draft.render(&config.release_notes))?;
    Ok(GeneratedNotes { path, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_version() {
        let given = "v2".to_string();
        let stacked = "v1".to_string();
        assert_eq!(pick_version(Some(&given), Some(&stacked), "target").unwrap(), "v2");
        assert_eq!(pick_version(None, Some(&stacked), "target").unwrap(), "v1");
        assert!(matches!(
            pick_version(None, None, "previous"),
            Err(ReleaseNotesError::MissingVersion(ref w)) if w == "previous"
        ));
        let empty = String::new();
        assert!(pick_version(None, Some(&empty), "target").is_err());
    }
}
