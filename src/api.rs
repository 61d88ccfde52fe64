use std::fmt::Display;

use log::{debug, warn};
use serde::Deserialize;

use crate::connectivity::{Endpoint, API_URL_VAR};
use crate::quiz::{HistoryEntry, QuizDocument};

/// Every failure of the quiz service, reduced to what the user should read.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Backend server is not configured. Set {} to the URL of your deployed backend.", API_URL_VAR)]
    NotConfigured,
    #[error("Cannot connect to backend server at {base_url}. Please check if the backend is running.")]
    Unreachable { base_url: String },
    #[error("{0}")]
    Generation(String),
    #[error("Failed to fetch history")]
    HistoryUnavailable,
    #[error("Failed to fetch quiz")]
    QuizUnavailable,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

pub struct QuizApi {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl QuizApi {
    pub fn new(http: reqwest::Client, endpoint: Endpoint) -> Self {
        Self { http, endpoint }
    }

    pub async fn generate_quiz(&self, url: &str) -> Result<QuizDocument, ApiError> {
        debug!("Requesting quiz for {}", url);
        let resp = self
            .http
            .post(self.endpoint.url("generate_quiz"))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .and_then(|detail| detail.as_str().map(str::to_string));
            warn!("Quiz generation for {} failed with HTTP {}", url, status);
            return Err(ApiError::Generation(
                detail.unwrap_or_else(|| "Failed to generate quiz".to_string()),
            ));
        }

        self.decode_quiz(resp).await
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        let resp = self
            .http
            .get(self.endpoint.url("history"))
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        if !resp.status().is_success() {
            warn!("History request failed with HTTP {}", resp.status());
            return Err(ApiError::HistoryUnavailable);
        }

        let body = resp.bytes().await.map_err(|e| self.transport_failure(e))?;
        serde_json::from_slice(&body).map_err(|e| self.malformed(e))
    }

    pub async fn quiz(&self, id: i64) -> Result<QuizDocument, ApiError> {
        let resp = self
            .http
            .get(self.endpoint.url(&format!("quiz/{}", id)))
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        if !resp.status().is_success() {
            warn!("Quiz {} request failed with HTTP {}", id, resp.status());
            return Err(ApiError::QuizUnavailable);
        }

        self.decode_quiz(resp).await
    }

    async fn decode_quiz(&self, resp: reqwest::Response) -> Result<QuizDocument, ApiError> {
        let body = resp.bytes().await.map_err(|e| self.transport_failure(e))?;
        let quiz: QuizDocument = serde_json::from_slice(&body).map_err(|e| self.malformed(e))?;
        quiz.validate().map_err(|e| self.malformed(e))?;
        Ok(quiz)
    }

    fn transport_failure(&self, err: reqwest::Error) -> ApiError {
        warn!("Request to {} failed: {}", self.endpoint.base_url, err);
        if self.endpoint.is_misconfigured() {
            ApiError::NotConfigured
        } else {
            self.unreachable()
        }
    }

    // An unreadable body is reported like a dead server.
    fn malformed(&self, reason: impl Display) -> ApiError {
        warn!("Malformed response from {}: {}", self.endpoint.base_url, reason);
        self.unreachable()
    }

    fn unreachable(&self) -> ApiError {
        ApiError::Unreachable {
            base_url: self.endpoint.base_url.clone(),
        }
    }
}
