//! Open or comment on the pull request that carries an automated data update.
//!
//! After the data pipeline pushes to the update branch, [`run`] either comments on
//! the already-open PR from that branch or opens a new one against the base branch.
//! The GitHub calls go through [`PullRequestApi`] so the decision logic can be tested
//! without a network.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_TITLE: &str = "Automatic data update";
pub const DEFAULT_BASE: &str = "master";
pub const DEFAULT_COMMENT: &str = "New data pushed!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrInputs {
    pub owner: String,
    pub repo: String,
    /// Title prefix; the date is appended.
    pub title: String,
    pub base: String,
    pub make_comment: bool,
    pub comment: String,
    pub data_update_branch: String,
}

impl PrInputs {
    /// `owner:branch`, the form GitHub uses for PR heads.
    pub fn head_label(&self) -> String {
        format!("{}:{}", self.owner, self.data_update_branch)
    }

    pub fn title_for(&self, date: NaiveDate) -> String {
        format!("{} - {}", self.title, date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullHead {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub head: PullHead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub maintainer_can_modify: bool,
}

/// The three GitHub REST calls the bot needs.
pub trait PullRequestApi {
    /// Open PRs whose head is `head` (`owner:branch`).
    fn list_open(&self, owner: &str, repo: &str, head: &str) -> Result<Vec<PullRequest>>;
    fn create_comment(&self, owner: &str, repo: &str, issue_number: u64, body: &str) -> Result<()>;
    fn create_pull(&self, owner: &str, repo: &str, pull: &NewPullRequest) -> Result<PullRequest>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Commented { number: u64 },
    SkippedComment { number: u64 },
    Created { number: u64 },
}

/// Comment on the open update PR, or create one.
pub fn run(inputs: &PrInputs, api: &dyn PullRequestApi, today: NaiveDate) -> Result<Outcome> {
    let head = inputs.head_label();
    log::info!("checking PRs: {}/{} {}", inputs.owner, inputs.repo, head);
    let prs = api.list_open(&inputs.owner, &inputs.repo, &head)?;

    match prs.first() {
        Some(pr) if pr.head.label == head => {
            if inputs.make_comment {
                api.create_comment(&inputs.owner, &inputs.repo, pr.number, &inputs.comment)?;
                log::info!("commented on PR #{}", pr.number);
                Ok(Outcome::Commented { number: pr.number })
            } else {
                log::info!("skip commenting on PR #{}", pr.number);
                Ok(Outcome::SkippedComment { number: pr.number })
            }
        }
        _ => {
            log::info!(
                "creating PR: {}/{} head {} base {}",
                inputs.owner,
                inputs.repo,
                head,
                inputs.base
            );
            let created = api.create_pull(
                &inputs.owner,
                &inputs.repo,
                &NewPullRequest {
                    title: inputs.title_for(today),
                    head,
                    base: inputs.base.clone(),
                    maintainer_can_modify: true,
                },
            )?;
            log::info!("created PR #{}", created.number);
            Ok(Outcome::Created {
                number: created.number,
            })
        }
    }
}

// Owner/repo names and query values
const SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

fn enc(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, SAFE).to_string()
}

/// [`PullRequestApi`] over the GitHub REST API. Requests are not retried.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub api_url: String,
    http: HttpClient,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_url(token, "https://api.github.com")
    }

    pub fn with_api_url(token: &str, api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token)).context("token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("data-update-pr/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("build http client")?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, enc(owner), enc(repo))
    }
}

fn check(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    // GitHub puts a human-readable reason in `message`
    let body: serde_json::Value = resp.json().unwrap_or_default();
    match body.get("message").and_then(|m| m.as_str()) {
        Some(msg) => bail!("{}", msg),
        None => bail!("GitHub API request failed with HTTP {}", status),
    }
}

impl PullRequestApi for GitHubClient {
    fn list_open(&self, owner: &str, repo: &str, head: &str) -> Result<Vec<PullRequest>> {
        let url = format!("{}/pulls?state=open&head={}", self.repo_url(owner, repo), enc(head));
        let resp = self.http.get(&url).send().with_context(|| format!("GET {}", url))?;
        check(resp)?.json().context("decode pull request list")
    }

    fn create_comment(&self, owner: &str, repo: &str, issue_number: u64, body: &str) -> Result<()> {
        let url = format!("{}/issues/{}/comments", self.repo_url(owner, repo), issue_number);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "body": body }))
            .send()
            .with_context(|| format!("POST {}", url))?;
        check(resp)?;
        Ok(())
    }

    fn create_pull(&self, owner: &str, repo: &str, pull: &NewPullRequest) -> Result<PullRequest> {
        let url = format!("{}/pulls", self.repo_url(owner, repo));
        let resp = self
            .http
            .post(&url)
            .json(pull)
            .send()
            .with_context(|| format!("POST {}", url))?;
        check(resp)?.json().context("decode created pull request")
    }
}

/// Parse an action-style boolean input: only the exact word `"true"` is true.
pub fn parse_flag(s: &str) -> bool {
    s.trim() == "true"
}

/// Split `GITHUB_REPOSITORY` (`owner/repo`).
pub fn split_repository(s: &str) -> Option<(String, String)> {
    let (owner, repo) = s.split_once('/')?;
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
