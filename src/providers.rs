//! Seams for the external services. Handlers only see these traits, so the
//! HTTP clients can be swapped for fakes in tests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} not set")]
    MissingCredentials(&'static str),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{provider} returned status={status} body={body}")]
    Status { provider: &'static str, status: StatusCode, body: String },
    #[error("{provider} prediction {state}: {detail}")]
    Prediction { provider: &'static str, state: String, detail: String },
    #[error("Other: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

/// Turns a creative brief into a refined image prompt.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Produces one or more encoded images guided by a control image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, control_image_url: &str) -> Result<Vec<Bytes>, ProviderError>;
}

/// Describes how an image measures up against the weighted criteria.
#[async_trait]
pub trait ScoringProvider: Send + Sync {
    async fn score(&self, image_url: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Stability endpoints reached by the studio routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditEndpoint {
    GenerateCore,
    SearchAndReplace,
    Sketch,
}

impl EditEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            EditEndpoint::GenerateCore => "/v2beta/stable-image/generate/core",
            EditEndpoint::SearchAndReplace => "/v2beta/stable-image/edit/search-and-replace",
            EditEndpoint::Sketch => "/v2beta/stable-image/control/sketch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// One multipart submission: text fields in order plus an optional image part.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub endpoint: EditEndpoint,
    pub fields: Vec<(String, String)>,
    pub image: Option<UploadedImage>,
}

/// Raw upstream answer; the studio routes decide what each status means.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamReply {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn submit(&self, request: EditRequest) -> Result<UpstreamReply, ProviderError>;
    async fn fetch_result(&self, generation_id: &str) -> Result<UpstreamReply, ProviderError>;
}
