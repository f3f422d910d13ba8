//! Shared plumbing for the `trigger` and `run-job` binaries.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use jobhook_api::RunNowRequest;
use jobhook_types::{CorrelationId, JobInvocationParams};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// How long `trigger` waits for the front door to answer.
pub const RUN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Arguments of the `trigger` binary.
#[derive(Debug, Parser)]
#[command(name = "trigger", version, about = "Start (or poll) a workflow run through a jobhook front door")]
pub struct TriggerArgs {
    /// Correlation id of the run.
    #[arg(long)]
    pub id: String,
    /// Base URL of the front door, e.g. http://localhost:8000
    #[arg(long)]
    pub url: String,
}

/// Arguments of the `run-job` binary.
#[derive(Debug, Parser)]
#[command(name = "run-job", version, about = "Submit a single run of a job to the job platform")]
pub struct RunJobArgs {
    /// Job to run. Defaults to `JOB_ID`.
    #[arg(long)]
    pub job_id: Option<u64>,
    /// Correlation id passed to the job as `promise_id`.
    #[arg(long, requires = "url")]
    pub id: Option<String>,
    /// URL passed to the job as `url`.
    #[arg(long, requires = "id")]
    pub url: Option<String>,
}

impl RunJobArgs {
    /// Body for the run-now call; without `--id`/`--url` no notebook parameters are sent.
    pub fn run_now_request(&self, job_id: u64) -> Result<RunNowRequest> {
        match (&self.id, &self.url) {
            (Some(id), Some(url)) => {
                let params = JobInvocationParams::new(job_id, CorrelationId::new(id.as_str())?, url.as_str());
                Ok(RunNowRequest::from(&params))
            }
            _ => Ok(RunNowRequest::bare(job_id)),
        }
    }
}

/// A failed `/run` call, worded for the terminal.
#[derive(Debug, Error)]
#[error("Error calling {url}/run with id={id}: {source}")]
pub struct TriggerError {
    url: String,
    id: String,
    #[source]
    source: reqwest::Error,
}

/// Call `GET {base_url}/run?id=..&url=..` and return the response body.
///
/// Non-2xx statuses, network failures and timeouts are errors.
pub async fn call_run(base_url: &str, id: &str) -> Result<String, TriggerError> {
    let base = base_url.trim_end_matches('/');
    let failed = |source: reqwest::Error| TriggerError {
        url: base.to_string(),
        id: id.to_string(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(RUN_REQUEST_TIMEOUT)
        .build()
        .map_err(failed)?;
    debug!(url = %base, id, "calling front door");
    let response = client
        .get(format!("{base}/run"))
        .query(&[("id", id), ("url", base_url)])
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(failed)?;
    response.text().await.map_err(failed)
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`), so stdout stays clean.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::{Router, routing::get};
    use std::collections::HashMap;
    use std::net::SocketAddr;

    async fn spawn_front_door(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        address
    }

    #[tokio::test]
    async fn call_run_returns_body_and_forwards_query() {
        let router = Router::new().route(
            "/run",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                format!("{}|{}", query["id"], query["url"])
            }),
        );
        let address = spawn_front_door(router).await;
        let base = format!("http://{address}");

        let body = call_run(&base, "abc").await.unwrap();
        assert_eq!(body, format!("abc|{base}"));
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let router = Router::new().route("/run", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }));
        let address = spawn_front_door(router).await;
        let base = format!("http://{address}");

        let error = call_run(&base, "abc").await.unwrap_err();
        assert!(error.to_string().starts_with(&format!("Error calling {base}/run with id=abc: ")));
    }

    #[tokio::test]
    async fn unreachable_front_door_names_url_and_id() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{address}/");
        let error = call_run(&base, "xyz").await.unwrap_err();
        assert!(
            error
                .to_string()
                .starts_with(&format!("Error calling http://{address}/run with id=xyz: "))
        );
    }

    #[test]
    fn trigger_args_require_id_and_url() {
        let args = TriggerArgs::try_parse_from(["trigger", "--id", "abc", "--url", "http://localhost:8000"]).unwrap();
        assert_eq!(args.id, "abc");
        assert!(TriggerArgs::try_parse_from(["trigger", "--id", "abc"]).is_err());
    }

    #[test]
    fn run_job_without_params_sends_bare_request() {
        let args = RunJobArgs::try_parse_from(["run-job", "--job-id", "12"]).unwrap();
        assert_eq!(args.run_now_request(12).unwrap(), RunNowRequest::bare(12));
        assert!(RunJobArgs::try_parse_from(["run-job", "--id", "abc"]).is_err());
    }

    #[test]
    fn run_job_with_params_sends_notebook_params() {
        let args = RunJobArgs::try_parse_from(["run-job", "--id", "abc", "--url", "http://cb"]).unwrap();
        let request = args.run_now_request(5).unwrap();
        let params = request.notebook_params.unwrap();
        assert_eq!(params["promise_id"], "abc");
        assert_eq!(params["url"], "http://cb");
    }
}
