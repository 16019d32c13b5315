//! Cross-check of merge requests found in git history against the ones
//! GitLab lists for a milestone.
//!
//! Neither source is trusted over the other: the result is their union and
//! every discrepancy becomes a warning for the release manager.

use std::collections::BTreeSet;

use regex_lite::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{GitLabError, ReleaseNotesError};
use crate::git::GitClient;
use crate::gitlab::{GitLabClient, MergeRequest, Milestone};

/// Ref under which `git fetch` stores merge request heads.
pub const MR_REFSPEC: &str = "+refs/merge-requests/*/head:refs/remotes/origin/merge-requests/*";

const MR_REF_PATTERN: &str = r"^refs/remotes/origin/merge-requests/(\d+)$";
const MR_MESSAGE_PATTERN: &str = r"(?m)^See merge request [^ ]*!(\d+)$";
const JIRA_PATTERN: &str = r"[A-Z][A-Z]+-[0-9]+";
const GITLAB_ISSUE_PATTERN: &str = r"(?:((?:[A-Za-z0-9_.-]+/)*)([A-Za-z0-9_.-]+))?(#[0-9]+)";

/// A merge request as it appears in the release notes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MergeRequestRecord {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub state: String,
    pub web_url: String,
    pub author: String,
    /// Short reference, e.g. `!42`.
    pub reference: String,
    /// Full name of the project the MR belongs to.
    pub project_fullname: String,
    /// GitLab issues then JIRA tasks mentioned in title or description.
    pub issue_refs: Vec<String>,
}

impl MergeRequestRecord {
    pub fn from_api(mr: MergeRequest, project_fullname: &str) -> Self {
        let description = mr.description.unwrap_or_default();
        let issue_refs = find_issue_refs(&mr.title, &description, project_fullname);
        let reference = if mr.references.short.is_empty() {
            format!("!{}", mr.iid)
        } else {
            mr.references.short
        };
        Self {
            id: mr.id,
            iid: mr.iid,
            title: mr.title,
            description,
            labels: mr.labels,
            state: mr.state,
            web_url: mr.web_url,
            author: mr.author.username,
            reference,
            project_fullname: project_fullname.to_string(),
            issue_refs,
        }
    }

    /// Reference to this MR as seen from project `relative_to`
    /// (`!42` for the same project, `LHCb!42` for a sibling).
    pub fn reference_from(&self, relative_to: &str) -> String {
        format!(
            "{}{}",
            rel_project_path(&self.project_fullname, relative_to),
            self.reference
        )
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

/// Union of both sources plus the discrepancies between them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub merge_requests: Vec<MergeRequestRecord>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Strip from `path` the leading components it shares with `to`.
///
/// `lhcb/LHCb` relative to `lhcb/Lbcom` is `LHCb`; relative to
/// `gaudi/Gaudi` it stays `lhcb/LHCb`; relative to itself it is empty.
pub fn rel_project_path(path: &str, to: &str) -> String {
    let to: Vec<&str> = to.split('/').collect();
    let parts: Vec<&str> = path
        .split('/')
        .enumerate()
        .skip_while(|(i, part)| to.get(*i) == Some(part))
        .map(|(_, part)| part)
        .collect();
    parts.join("/")
}

/// Issue references in an MR's title and description: GitLab issues
/// (`#12`, `Project#12`, `group/Project#12`, expressed relative to
/// `project_fullname`) sorted and deduplicated, followed by JIRA tasks
/// (`LBCORE-123`) sorted and deduplicated.
pub fn find_issue_refs(title: &str, description: &str, project_fullname: &str) -> Vec<String> {
    let (Ok(gitlab_re), Ok(jira_re)) = (Regex::new(GITLAB_ISSUE_PATTERN), Regex::new(JIRA_PATTERN))
    else {
        return Vec::new();
    };
    let parent = project_fullname
        .rsplit_once('/')
        .map(|(group, _)| group)
        .unwrap_or("");

    let mut gitlab: BTreeSet<String> = BTreeSet::new();
    let mut jira: BTreeSet<String> = BTreeSet::new();
    for text in [title, description] {
        for caps in gitlab_re.captures_iter(text) {
            let group = caps.get(1).map_or("", |m| m.as_str());
            let name = caps.get(2).map_or("", |m| m.as_str());
            let issue = caps.get(3).map_or("", |m| m.as_str());
            let normalized = if name.is_empty() {
                issue.to_string()
            } else {
                let project = if group.is_empty() {
                    format!("{}/{}", parent, name)
                } else {
                    format!("{}{}", group, name)
                };
                format!("{}{}", rel_project_path(&project, project_fullname), issue)
            };
            gitlab.insert(normalized);
        }
        for m in jira_re.find_iter(text) {
            jira.insert(m.as_str().to_string());
        }
    }
    gitlab.into_iter().chain(jira).collect()
}

/// MR iid from the full ref names decorating a merge's second parent.
/// Several candidates resolve to the lexically first, with a warning.
pub fn iid_from_refs(refs: &[String]) -> Option<u64> {
    let re = Regex::new(MR_REF_PATTERN).ok()?;
    let mut matches: Vec<&str> = refs
        .iter()
        .filter_map(|name| re.captures(name).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .collect();
    matches.sort_unstable();
    if matches.len() > 1 {
        warn!(
            "multiple merge requests associated with the same commit: {:?}, taking the first",
            matches
        );
    }
    matches.first().and_then(|s| s.parse().ok())
}

/// MR iid from a `See merge request group/project!42` line.
pub fn iid_from_message(message: &str) -> Option<u64> {
    let re = Regex::new(MR_MESSAGE_PATTERN).ok()?;
    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `group/name` of a GitLab project from a remote URL on `host`.
pub fn project_fullname_from_url(url: &str, host: &str) -> Option<String> {
    let pattern = format!(
        r"{}.*/([^/]+/[^/]+?)(?:\.git)?/?$",
        regex_lite::escape(host)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The one milestone titled exactly `title` among search results.
pub fn select_milestone(
    milestones: Vec<Milestone>,
    title: &str,
    project_fullname: &str,
) -> Result<Milestone, GitLabError> {
    let mut exact: Vec<Milestone> = milestones.into_iter().filter(|m| m.title == title).collect();
    match exact.len() {
        0 => Err(GitLabError::MilestoneNotFound {
            milestone: title.to_string(),
            project: project_fullname.to_string(),
        }),
        1 => Ok(exact.remove(0)),
        count => Err(GitLabError::AmbiguousMilestone {
            milestone: title.to_string(),
            project: project_fullname.to_string(),
            count,
        }),
    }
}

/// Merge both sources into a [`Reconciliation`].
///
/// Git history order is kept; MRs only attached to the milestone come after.
/// When the milestone lists nothing a single warning replaces the per-MR
/// cross-check.
pub fn reconcile(
    from_git: Vec<MergeRequest>,
    from_milestone: Vec<MergeRequest>,
    since: &str,
    milestone: &str,
    project_fullname: &str,
) -> Reconciliation {
    let mut warnings = Vec::new();
    let mut merged = from_git;

    if from_milestone.is_empty() {
        warnings.push(format!(
            "No merge requests found with {} milestone for {}",
            milestone, project_fullname
        ));
    } else {
        let git_ids: BTreeSet<u64> = merged.iter().map(|mr| mr.id).collect();
        let milestone_ids: BTreeSet<u64> = from_milestone.iter().map(|mr| mr.id).collect();
        for mr in &merged {
            if !milestone_ids.contains(&mr.id) {
                warnings.push(format!("Milestone not set for MR {}", mr.iid));
            }
        }
        for mr in from_milestone {
            if !git_ids.contains(&mr.id) {
                warnings.push(format!(
                    "MR {} not merged in current branch after {} (state {})",
                    mr.iid, since, mr.state
                ));
                merged.push(mr);
            }
        }
    }

    Reconciliation {
        merge_requests: merged
            .into_iter()
            .map(|mr| MergeRequestRecord::from_api(mr, project_fullname))
            .collect(),
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Gathers both MR sets for one repository and reconciles them.
pub struct MrReconciler<'a> {
    git: &'a GitClient,
    gitlab: &'a GitLabClient,
    host: String,
}

impl<'a> MrReconciler<'a> {
    pub fn new(git: &'a GitClient, gitlab: &'a GitLabClient, host: impl Into<String>) -> Self {
        Self {
            git,
            gitlab,
            host: host.into(),
        }
    }

    /// Full GitLab name of the project behind the `origin` remote.
    pub fn project_fullname(&self) -> Result<String, ReleaseNotesError> {
        self.git
            .remote_url("origin")
            .and_then(|url| project_fullname_from_url(&url, &self.host))
            .ok_or_else(|| {
                ReleaseNotesError::ProjectNotDetected(self.git.workdir().display().to_string())
            })
    }

    /// Iids of the MRs merged (first-parent) in `since..until`, oldest merge
    /// last as `git log` lists them.
    pub async fn merge_request_iids(&self, since: &str, until: &str) -> Result<Vec<u64>, ReleaseNotesError> {
        self.git.run(&["fetch", "-q", "origin", MR_REFSPEC]).await?;
        let range = format!("{}..{}", since, until);
        let log = self
            .git
            .run(&[
                "log",
                "--first-parent",
                "--parents",
                "--merges",
                "--no-color",
                "--format=%H %P",
                &range,
            ])
            .await?;

        let mut iids: Vec<u64> = Vec::new();
        for line in log.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [merge, _, second, ..] = fields.as_slice() else {
                continue;
            };
            match self.find_merge_request_id(merge, second).await? {
                Some(iid) if !iids.contains(&iid) => iids.push(iid),
                Some(iid) => debug!(iid, "merge request merged more than once"),
                None => {}
            }
        }
        Ok(iids)
    }

    /// Iid of the MR a merge commit brought in: from the refs of its second
    /// parent, else from the merge message.
    async fn find_merge_request_id(
        &self,
        merge: &str,
        second_parent: &str,
    ) -> Result<Option<u64>, ReleaseNotesError> {
        let refs = self.git.ref_names(second_parent).await?;
        if let Some(iid) = iid_from_refs(&refs) {
            return Ok(Some(iid));
        }
        debug!(
            merge,
            second_parent, "second parent does not correspond to a merge request ref"
        );
        let message = self.git.commit_message(merge).await?;
        if let Some(iid) = iid_from_message(&message) {
            return Ok(Some(iid));
        }
        warn!(
            "could not find MR for {} based on second parent ({}) refs or commit message; \
             did you squash and modify the message, or push directly from the command line?",
            merge, second_parent
        );
        Ok(None)
    }

    /// Set A: MRs found in git history, in history order.
    pub async fn merge_requests_from_git(
        &self,
        project_id: u64,
        since: &str,
        until: &str,
    ) -> Result<Vec<MergeRequest>, ReleaseNotesError> {
        let iids = self.merge_request_iids(since, until).await?;
        let mut mrs = self.gitlab.merge_requests_by_iids(project_id, &iids).await?;
        if mrs.len() != iids.len() {
            return Err(GitLabError::IncompleteListing {
                expected: iids.len(),
                got: mrs.len(),
            }
            .into());
        }
        mrs.sort_by_key(|mr| iids.iter().position(|iid| *iid == mr.iid));
        Ok(mrs)
    }

    /// Set B: MRs attached to the milestone titled exactly `title`.
    pub async fn merge_requests_from_milestone(
        &self,
        project_id: u64,
        project_fullname: &str,
        title: &str,
    ) -> Result<Vec<MergeRequest>, ReleaseNotesError> {
        let milestones = match self.gitlab.search_milestones(project_id, title).await {
            Ok(found) => found,
            Err(GitLabError::AuthenticationRequired(detail)) => {
                warn!(%detail, "milestones cannot be retrieved: provide a GitLab token");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let milestone = select_milestone(milestones, title, project_fullname)?;
        Ok(self
            .gitlab
            .milestone_merge_requests(project_id, milestone.id)
            .await?)
    }

    /// Reconcile the MRs merged since `since` with milestone `milestone`.
    pub async fn find_merge_requests(
        &self,
        since: &str,
        milestone: &str,
    ) -> Result<Reconciliation, ReleaseNotesError> {
        let fullname = self.project_fullname()?;
        let project = self.gitlab.get_project(&fullname).await?;
        let from_git = self.merge_requests_from_git(project.id, since, "").await?;
        let from_milestone = self
            .merge_requests_from_milestone(project.id, &fullname, milestone)
            .await?;
        debug!(
            git = from_git.len(),
            milestone = from_milestone.len(),
            "merge requests found"
        );

        let result = reconcile(from_git, from_milestone, since, milestone, &fullname);
        for warning in &result.warnings {
            warn!("{}", warning);
        }
        Ok(result)
    }
}
