use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::encoder::Submission;
use crate::live::PollOutcome;
use crate::snapshot::LiveStats;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid JSON in response with status {status}: {source}")]
    InvalidJson {
        status: StatusCode,
        source: serde_json::Error,
    },

    #[error("{message}")]
    Backend { status: StatusCode, message: String },

    #[error("invalid base URL `{0}`")]
    BaseUrl(String),
}

/// Response of a start request. Whatever JSON came back is kept verbatim.
#[derive(Debug, Clone)]
pub struct StartResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl StartResponse {
    /// The run id, only for successful responses that carry one.
    pub fn test_id(&self) -> Option<String> {
        if !self.status.is_success() {
            return None;
        }

        match self.body.get("test_id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.body.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveResponse {
    Stats(LiveStats),
    Pending(String),
}

impl From<Result<LiveResponse, ClientError>> for PollOutcome {
    fn from(result: Result<LiveResponse, ClientError>) -> Self {
        match result {
            Ok(LiveResponse::Stats(stats)) => PollOutcome::Stats(stats),
            Ok(LiveResponse::Pending(message)) => PollOutcome::Pending(message),
            Err(error) => PollOutcome::Failed(error.to_string()),
        }
    }
}

#[derive(Debug)]
struct CapturedResponse {
    status: StatusCode,
    body_text: String,
}

impl CapturedResponse {
    async fn from_response(resp: Response) -> Result<Self, ClientError> {
        let status = resp.status();
        let body_text = resp.text().await?;

        Ok(Self { status, body_text })
    }

    fn json(&self) -> Result<Value, ClientError> {
        serde_json::from_str(&self.body_text).map_err(|source| ClientError::InvalidJson {
            status: self.status,
            source,
        })
    }
}

/// Client for the performance service REST API.
#[derive(Debug, Clone)]
pub struct PerfServiceClient {
    http: Client,
    base_url: Url,
}

impl PerfServiceClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|_| ClientError::BaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::BaseUrl(base_url.to_string()));
        }

        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Where `submission` is posted, below the base URL's own path.
    pub fn start_url(&self, submission: &Submission) -> Result<Url, ClientError> {
        let path = submission.path();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.endpoint(&segments)
    }

    /// Posts a start submission. Any HTTP response with a JSON body is
    /// returned, successful or not.
    pub async fn start(&self, submission: Submission) -> Result<StartResponse, ClientError> {
        let url = self.start_url(&submission)?;

        tracing::info!(%url, test_type = %submission.test_type, "submitting test run");

        let resp = self
            .http
            .post(url)
            .multipart(submission.into_multipart())
            .send()
            .await?;
        let captured = CapturedResponse::from_response(resp).await?;
        let body = captured.json()?;

        tracing::debug!(status = %captured.status, "start response received");

        Ok(StartResponse {
            status: captured.status,
            body,
        })
    }

    pub async fn live_results(&self, test_id: &str) -> Result<LiveResponse, ClientError> {
        let url = self.endpoint(&["perf-service", "api", "results", test_id, "live"])?;

        tracing::debug!(%url, "fetching live results");

        let resp = self.http.get(url).send().await?;
        let captured = CapturedResponse::from_response(resp).await?;
        let status = captured.status;

        if !status.is_success() {
            let message = captured
                .json()
                .ok()
                .and_then(|body| body.get("error")?.as_str().map(str::to_string))
                .unwrap_or_else(|| {
                    format!(
                        "Error fetching results: {}",
                        status.canonical_reason().unwrap_or(status.as_str())
                    )
                });
            return Err(ClientError::Backend { status, message });
        }

        let body = captured.json()?;
        if status == StatusCode::ACCEPTED {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Waiting for test data...")
                .to_string();
            return Ok(LiveResponse::Pending(message));
        }

        let stats = serde_json::from_value(body)
            .map_err(|source| ClientError::InvalidJson { status, source })?;
        Ok(LiveResponse::Stats(stats))
    }
}
