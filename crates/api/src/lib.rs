//! Job platform API client.
//!
//! This crate provides a lightweight client for the platform's Jobs API.
//! It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults and a bearer token
//! - Reading the host, token and job id from the environment
//! - Validating the host for safety
//! - Firing a single "run now" request with job-level parameters
//!
//! The primary entry point is [`JobsClient`]. Create an instance via
//! [`JobsClient::new_from_env`] (or [`JobsClient::new`] with explicit
//! credentials), then call [`JobsClient::run_now`].
//!
//! # Example
//!
//! ```ignore
//! use jobhook_api::{JobsClient, RunNowRequest};
//!
//! async fn fire() -> anyhow::Result<()> {
//!     let client = JobsClient::new_from_env()?;
//!     let response = client.run_now(&RunNowRequest::bare(1234)).await?;
//!     println!("run id: {:?}", response.run_id);
//!     Ok(())
//! }
//! ```

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use jobhook_types::JobInvocationParams;
use jobhook_util::redact_sensitive;
use reqwest::{Client, Method, RequestBuilder, Url, header};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable holding the platform host URL.
pub const HOST_ENV: &str = "DATABRICKS_HOST";
/// Environment variable holding the platform API token.
pub const TOKEN_ENV: &str = "DATABRICKS_TOKEN";
/// Environment variable holding the numeric job identifier.
pub const JOB_ID_ENV: &str = "JOB_ID";

const RUN_NOW_PATH: &str = "/api/2.0/jobs/run-now";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Hostnames allowed over plain HTTP for local development.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Body of a "run now" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunNowRequest {
    pub job_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_params: Option<IndexMap<String, String>>,
}

impl RunNowRequest {
    /// Trigger a job without any job-level parameters.
    pub fn bare(job_id: u64) -> Self {
        Self {
            job_id,
            notebook_params: None,
        }
    }
}

impl From<&JobInvocationParams> for RunNowRequest {
    fn from(params: &JobInvocationParams) -> Self {
        Self {
            job_id: params.job_id,
            notebook_params: Some(params.notebook_params()),
        }
    }
}

/// Identifiers the platform returns for a started run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunNowResponse {
    #[serde(default)]
    pub run_id: Option<u64>,
    #[serde(default)]
    pub number_in_job: Option<u64>,
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for Jobs API access.
///
/// The client pre-configures the bearer token and builds requests against a
/// validated base URL.
pub struct JobsClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
}

impl JobsClient {
    /// Construct a client for `host`, authenticating with `token` when given.
    ///
    /// A host without a scheme is treated as HTTPS. Non-localhost hosts must use HTTPS.
    pub fn new(host: &str, token: Option<&str>) -> Result<Self> {
        let base_url = normalize_host(host);
        validate_base_url(&base_url)?;

        let mut default_headers = header::HeaderMap::new();
        if let Some(token) = token.filter(|token| !token.trim().is_empty()) {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| anyhow!("{TOKEN_ENV} contains characters not allowed in a header"))?;
            value.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, value);
        }
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("jobhook/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Construct a client from `DATABRICKS_HOST` and `DATABRICKS_TOKEN`.
    pub fn new_from_env() -> Result<Self> {
        let host = env::var(HOST_ENV).map_err(|_| anyhow!("{HOST_ENV} is not set"))?;
        let token = env::var(TOKEN_ENV).ok();
        Self::new(&host, token.as_deref())
    }

    /// Build a `reqwest::RequestBuilder` for a method and API-relative path.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "building request");

        self.http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent)
    }

    /// Start a run of the job now. Returns as soon as the platform accepts the run.
    pub async fn run_now(&self, request: &RunNowRequest) -> Result<RunNowResponse> {
        debug!(
            job_id = request.job_id,
            has_params = request.notebook_params.is_some(),
            "submitting run-now"
        );
        let response = self
            .request(Method::POST, RUN_NOW_PATH)
            .json(request)
            .send()
            .await
            .map_err(|error| anyhow!("run-now request for job {} failed: {}", request.job_id, redact_sensitive(&error.to_string())))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!(
                "job platform rejected run-now for job {} with HTTP {}: {}",
                request.job_id,
                status.as_u16(),
                redact_sensitive(text.trim())
            ));
        }

        if text.trim().is_empty() {
            return Ok(RunNowResponse::default());
        }
        serde_json::from_str(&text).context("parse run-now response")
    }

    /// Convenience wrapper firing a run for orchestrated invocation parameters.
    pub async fn trigger(&self, params: &JobInvocationParams) -> Result<RunNowResponse> {
        self.run_now(&RunNowRequest::from(params)).await
    }
}

/// Read the job identifier from `JOB_ID`.
pub fn job_id_from_env() -> Result<u64> {
    let raw = env::var(JOB_ID_ENV).map_err(|_| anyhow!("{JOB_ID_ENV} is not set"))?;
    parse_job_id(&raw)
}

/// Parse a numeric job identifier.
pub fn parse_job_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| anyhow!("invalid job id '{}': {}", raw.trim(), error))
}

fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
fn validate_base_url(base: &str) -> Result<()> {
    let parsed_base_url = Url::parse(base).map_err(|e| anyhow!("Invalid {HOST_ENV} URL '{}': {}", base, e))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| anyhow!("{HOST_ENV} must include a host"))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(anyhow!(
            "{HOST_ENV} must use https for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        ));
    }

    Ok(())
}
