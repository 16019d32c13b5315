//! Stack description: versions of a set of projects and their dependencies.
//!
//! The description is a JSON object mapping each project to
//! `[previous version, target version, [dependencies...]]`:
//!
//! ```json
//! {"LHCb": ["v50r6", "v51r0", ["Gaudi"]], "Gaudi": ["v33r0", "v33r0", ["LCG"]]}
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ReleaseNotesError;
use crate::git::protocol::guess_project_fullname;
use crate::release::reconcile::rel_project_path;

/// Versions and direct dependencies of one project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "(String, String, Vec<String>)")]
pub struct StackEntry {
    pub previous: String,
    pub target: String,
    pub dependencies: Vec<String>,
}

impl From<(String, String, Vec<String>)> for StackEntry {
    fn from((previous, target, dependencies): (String, String, Vec<String>)) -> Self {
        Self {
            previous,
            target,
            dependencies,
        }
    }
}

impl StackEntry {
    /// Whether the project moved to a new version.
    pub fn changed(&self) -> bool {
        !self.previous.is_empty() && !self.target.is_empty() && self.previous != self.target
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Stack {
    projects: BTreeMap<String, StackEntry>,
}

impl Stack {
    pub fn from_json(json: &str) -> Result<Self, ReleaseNotesError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ReleaseNotesError> {
        debug!(path = %path.display(), "loading stack description");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, project: &str) -> Option<&StackEntry> {
        self.projects.get(project)
    }

    /// All transitive dependencies of `project`, breadth first. A project
    /// reached twice is reported as a circular dependency.
    pub fn dependencies(&self, project: &str) -> Result<Vec<(String, StackEntry)>, ReleaseNotesError> {
        let mut found: Vec<(String, StackEntry)> = Vec::new();
        let mut remaining = vec![project.to_string()];
        while !remaining.is_empty() {
            let level: BTreeSet<&str> = remaining
                .iter()
                .filter_map(|name| self.projects.get(name))
                .flat_map(|entry| entry.dependencies.iter().map(String::as_str))
                .collect();
            remaining = Vec::with_capacity(level.len());
            for dep in level {
                if dep == project || found.iter().any(|(name, _)| name == dep) {
                    return Err(ReleaseNotesError::CircularDependency(dep.to_string()));
                }
                let entry = self
                    .projects
                    .get(dep)
                    .ok_or_else(|| ReleaseNotesError::UnknownStackProject(dep.to_string()))?;
                found.push((dep.to_string(), entry.clone()));
                remaining.push(dep.to_string());
            }
        }
        Ok(found)
    }
}

/// Markdown line describing the version of a dependency, with a link
/// relative to the GitLab page of `project_fullname`.
pub fn dependency_line(name: &str, version: &str, project_fullname: &str) -> String {
    if name == "LCG" {
        let (ver, text) = version.split_once(' ').unwrap_or((version, ""));
        return format!(
            "LCG [{ver}](http://lcginfo.cern.ch/release/{ver}/) {text}",
            ver = ver,
            text = text
        )
        .trim_end()
        .to_string();
    }
    let relpath = rel_project_path(&guess_project_fullname(name), project_fullname);
    let dots = vec![".."; relpath.split('/').count() + 1].join("/");
    format!(
        "{name} [{ver}]({dots}/{relpath}/-/tags/{ver})",
        name = name,
        ver = version,
        dots = dots,
        relpath = relpath
    )
}
