//! GitHub REST API client for pull request metadata

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::domain::PullRequest;
use crate::infrastructure::traits::SourceControl;
use crate::infrastructure::{InfraError, InfraResult};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FILES_PER_PAGE: usize = 100;
/// GitHub stops listing PR files after 3000 entries.
const MAX_FILE_PAGES: usize = 30;

#[derive(Debug, Deserialize)]
struct PullResponse {
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    filename: String,
}

/// Blocking GitHub client authenticated with a token.
pub struct GithubClient {
    client: Client,
    api_url: String,
}

impl GithubClient {
    pub fn new(api_url: &str, token: &str) -> InfraResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            InfraError::Http {
                message: format!("invalid token: {e}"),
                status: None,
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("genesis-ci/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InfraError::http("build HTTP client", e))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> InfraResult<T> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| InfraError::http(url, e))?
            .json()
            .map_err(|e| InfraError::http(url, e))
    }
}

impl SourceControl for GithubClient {
    fn pull_request(&self, repository: &str, number: u64) -> InfraResult<PullRequest> {
        let base = format!("{}/repos/{}/pulls/{}", self.api_url, repository, number);
        let pull: PullResponse = self.get(&base)?;

        let mut changed_files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let url = format!("{base}/files?per_page={FILES_PER_PAGE}&page={page}");
            let files: Vec<FileResponse> = self.get(&url)?;
            let last = files.len() < FILES_PER_PAGE;
            changed_files.extend(files.into_iter().map(|f| f.filename));
            if last {
                break;
            }
        }

        Ok(PullRequest {
            number,
            author: pull.user.login,
            changed_files,
        })
    }
}
