//! GitLab REST API (v4) access.

pub mod client;

pub use client::GitLabClient;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path_with_namespace: String,
    pub web_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub username: String,
}

/// Ways of referring to a merge request (`!42`, `group/project!42`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct References {
    pub short: String,
    #[serde(default)]
    pub full: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: String,
    pub web_url: String,
    pub author: UserSummary,
    #[serde(default)]
    pub references: References,
    #[serde(default)]
    pub milestone: Option<Milestone>,
}
