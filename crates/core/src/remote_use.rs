//! `git lb-use`: register a project repository as a remote.
//!
//! Tags of the project are fetched into their own namespace
//! (`refs/tags/<Project>/...`) so that tags of different projects never clash.

use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;
use crate::git::protocol::{project_url, Protocol, PROTOCOL_CONFIG_KEY};
use crate::git::GitClient;

/// Counts of refs available from the remote after the fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub branches: Vec<String>,
    pub tags: Vec<String>,
}

/// Protocol to use when none is given on the command line: the git config
/// `lb-use.protocol`, then `fallback`.
pub fn default_protocol(git: &GitClient, fallback: Protocol) -> Result<Protocol, GitError> {
    Ok(protocol_or(git.config_string(PROTOCOL_CONFIG_KEY)?, fallback))
}

/// Parse a configured protocol; unset or invalid values give `fallback`.
pub(crate) fn protocol_or(value: Option<String>, fallback: Protocol) -> Protocol {
    match value.map(|v| v.parse::<Protocol>()) {
        Some(Ok(protocol)) => protocol,
        Some(Err(e)) => {
            warn!("{}, using {}", e, fallback);
            fallback
        }
        None => fallback,
    }
}

/// Fetch refspec mapping the project's tags into `refs/tags/<project>/`.
pub fn tags_refspec(project: &str) -> String {
    format!("+refs/tags/*:refs/tags/{}/*", project)
}

/// Define (or redefine) remote `project` and fetch it.
#[instrument(skip(git))]
pub async fn lb_use(
    git: &GitClient,
    project: &str,
    url: Option<&str>,
    protocol: Protocol,
) -> Result<FetchSummary, GitError> {
    let url = url
        .map(str::to_string)
        .unwrap_or_else(|| project_url(project, protocol));
    info!("calling: git remote add -f '{}' '{}'", project, url);

    if let Some(old_url) = git.remote_url(project) {
        warn!("overwriting existing remote '{}' (was {})", project, old_url);
        git.run(&["remote", "remove", project]).await?;
    }

    git.run(&["remote", "add", project, &url]).await?;
    let tagopt = format!("remote.{}.tagopt", project);
    git.run(&["config", &tagopt, "--no-tags"]).await?;
    let fetch_key = format!("remote.{}.fetch", project);
    git.run(&["config", "--add", &fetch_key, &tags_refspec(project)])
        .await?;
    git.run(&["fetch", "--quiet", project]).await?;

    let summary = summarize(git, project).await?;
    info!(
        "fetched {} branches and {} tags",
        summary.branches.len(),
        summary.tags.len()
    );
    if !summary.branches.is_empty() {
        debug!("Branches:");
        for name in &summary.branches {
            debug!(" - {}", name);
        }
    }
    if !summary.tags.is_empty() {
        debug!("Tags:");
        for name in &summary.tags {
            debug!(" - {}", name);
        }
    }
    Ok(summary)
}

async fn summarize(git: &GitClient, project: &str) -> Result<FetchSummary, GitError> {
    let branch_prefix = format!("refs/remotes/{}/", project);
    let tag_prefix = format!("refs/tags/{}/", project);
    let listing = git
        .run(&["for-each-ref", "--format=%(refname)", &branch_prefix, &tag_prefix])
        .await?;
    Ok(classify_refs(&listing, project))
}

fn classify_refs(listing: &str, project: &str) -> FetchSummary {
    let branch_prefix = format!("refs/remotes/{}/", project);
    let tag_prefix = "refs/tags/";
    let mut summary = FetchSummary::default();
    for name in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(short) = name.strip_prefix(&branch_prefix) {
            summary.branches.push(format!("{}/{}", project, short));
        } else if let Some(short) = name.strip_prefix(tag_prefix) {
            summary.tags.push(short.to_string());
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_refspec() {
        assert_eq!(tags_refspec("LHCb"), "+refs/tags/*:refs/tags/LHCb/*");
    }

    #[test]
    fn test_protocol_or() {
        assert_eq!(protocol_or(None, Protocol::Krb5), Protocol::Krb5);
        assert_eq!(protocol_or(Some("ssh".into()), Protocol::Krb5), Protocol::Ssh);
        assert_eq!(protocol_or(Some("carrier-pigeon".into()), Protocol::Https), Protocol::Https);
    }

    #[test]
    fn test_classify_refs() {
        let listing = "refs/remotes/LHCb/master\nrefs/remotes/LHCb/run2-patches\nrefs/tags/LHCb/v50r0\n";
        let summary = classify_refs(listing, "LHCb");
        assert_eq!(summary.branches, vec!["LHCb/master", "LHCb/run2-patches"]);
        assert_eq!(summary.tags, vec!["LHCb/v50r0"]);
    }
}
