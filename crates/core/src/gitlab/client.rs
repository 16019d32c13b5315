//! Asynchronous GitLab REST API client.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::{MergeRequest, Milestone, Project};
use crate::config::GitLabConfig;
use crate::errors::GitLabError;

const PER_PAGE: &str = "100";

/// Read-only client for the subset of the GitLab API the tools need.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitLabClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GitLabError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("lbdevtools/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        info!(base_url = %base_url, authenticated = token.is_some(), "created GitLabClient");
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Build a client from the `[gitlab]` configuration section.
    pub fn from_config(config: &GitLabConfig) -> Result<Self, GitLabError> {
        Self::new(
            config.url.clone(),
            config.token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v4{}", self.base_url, endpoint)
    }

    fn get(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(self.api_url(endpoint));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Look up a project by full name (`group/name`).
    #[instrument(skip(self))]
    pub async fn get_project(&self, fullname: &str) -> Result<Project, GitLabError> {
        let endpoint = format!("/projects/{}", encode_project(fullname));
        let resp = self.get(&endpoint).send().await?;
        let project: Project = self.handle_response(resp, &endpoint).await?;
        debug!(id = project.id, "fetched project");
        Ok(project)
    }

    /// Milestones of `project` whose title contains `search`.
    #[instrument(skip(self))]
    pub async fn search_milestones(
        &self,
        project: u64,
        search: &str,
    ) -> Result<Vec<Milestone>, GitLabError> {
        let endpoint = format!("/projects/{}/milestones", project);
        let milestones: Vec<Milestone> = self
            .get_all_pages(&endpoint, &[("search".to_string(), search.to_string())])
            .await?;
        debug!(count = milestones.len(), "fetched milestones");
        Ok(milestones)
    }

    /// Merge requests attached to a milestone.
    #[instrument(skip(self))]
    pub async fn milestone_merge_requests(
        &self,
        project: u64,
        milestone: u64,
    ) -> Result<Vec<MergeRequest>, GitLabError> {
        let endpoint = format!("/projects/{}/milestones/{}/merge_requests", project, milestone);
        let mrs: Vec<MergeRequest> = self.get_all_pages(&endpoint, &[]).await?;
        debug!(count = mrs.len(), "fetched milestone merge requests");
        Ok(mrs)
    }

    /// Merge requests of `project` with the given project-scoped ids.
    #[instrument(skip(self, iids), fields(count = iids.len()))]
    pub async fn merge_requests_by_iids(
        &self,
        project: u64,
        iids: &[u64],
    ) -> Result<Vec<MergeRequest>, GitLabError> {
        if iids.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("/projects/{}/merge_requests", project);
        let mut query: Vec<(String, String)> = iids
            .iter()
            .map(|iid| ("iids[]".to_string(), iid.to_string()))
            .collect();
        query.push(("state".to_string(), "all".to_string()));
        let mrs: Vec<MergeRequest> = self.get_all_pages(&endpoint, &query).await?;
        debug!(count = mrs.len(), "fetched merge requests");
        Ok(mrs)
    }

    /// Follow `x-next-page` until the listing is exhausted.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>, GitLabError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let page_param = page.to_string();
            let resp = self
                .get(endpoint)
                .query(query)
                .query(&[("page", page_param.as_str()), ("per_page", PER_PAGE)])
                .send()
                .await?;
            let next = next_page(resp.headers());
            let data: Vec<T> = self.handle_response(resp, endpoint).await?;
            all.extend(data);
            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }
        Ok(all)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        endpoint: &str,
    ) -> Result<T, GitLabError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GitLabError::AuthenticationRequired(format!(
                "HTTP {} on {}",
                status, endpoint
            )));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GitLabError::ApiError {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            body,
        })
    }
}

/// URL-encode a project path for use as `:id`.
fn encode_project(fullname: &str) -> String {
    urlencoding::encode(fullname).into_owned()
}

fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-next-page")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}
