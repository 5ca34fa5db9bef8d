//! Shared fakes and request helpers for the router tests.
#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use bytes::Bytes;
use creative_studio::{
    pipeline::EvaluationPipeline,
    providers::{
        CompletionProvider, EditRequest, ImageEditor, ImageGenerator, ProviderError, ScoringProvider, UpstreamReply,
    },
    routes::{evaluation_router, AppState},
    storage::ImageStore,
    studio::{studio_router, StudioState},
};
use serde_json::Value;
use tower::ServiceExt;

pub const PUBLIC_BASE: &str = "http://creative.test:3000";

#[derive(Default)]
pub struct Calls(AtomicUsize);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn png(width: u32, height: u32) -> Bytes {
    let mut buf = Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    Bytes::from(buf.into_inner())
}

// ---------------------------------------------------------------------------
// Evaluation fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProviders {
    pub completions: Calls,
    pub generations: Calls,
    pub scorings: Calls,
    pub images: Vec<Bytes>,
    pub scoring_fails: bool,
}

#[async_trait]
impl CompletionProvider for FakeProviders {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.completions.hit();
        Ok("Minimal poster, product centered, CTA bottom right".into())
    }
}

#[async_trait]
impl ImageGenerator for FakeProviders {
    async fn generate(&self, _prompt: &str, _control: &str) -> Result<Vec<Bytes>, ProviderError> {
        self.generations.hit();
        Ok(self.images.clone())
    }
}

#[async_trait]
impl ScoringProvider for FakeProviders {
    async fn score(&self, _image_url: &str, _prompt: &str) -> Result<String, ProviderError> {
        self.scorings.hit();
        if self.scoring_fails {
            return Err(ProviderError::Other("scoring model unavailable".into()));
        }
        Ok("separation : 20 %, brand : 20 %, appeal : 20 %, focus : 20 %, cta : 20 %, totalScore : 100 %".into())
    }
}

pub fn evaluation_app(providers: Arc<FakeProviders>, dir: &std::path::Path) -> Router {
    let pipeline = EvaluationPipeline::new(
        providers.clone(),
        providers.clone(),
        providers,
        ImageStore::new(dir, PUBLIC_BASE),
    );
    evaluation_router(AppState { pipeline: Arc::new(pipeline) }, Duration::from_secs(300))
}

// ---------------------------------------------------------------------------
// Studio fakes
// ---------------------------------------------------------------------------

pub struct FakeEditor {
    pub status: StatusCode,
    pub body: Bytes,
    pub submissions: Calls,
    pub fetches: Calls,
    pub last_request: Mutex<Option<EditRequest>>,
}

impl FakeEditor {
    pub fn replying(status: StatusCode, body: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.into(),
            submissions: Calls::default(),
            fetches: Calls::default(),
            last_request: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ImageEditor for FakeEditor {
    async fn submit(&self, request: EditRequest) -> Result<UpstreamReply, ProviderError> {
        self.submissions.hit();
        *self.last_request.lock().unwrap() = Some(request);
        Ok(UpstreamReply { status: self.status, body: self.body.clone() })
    }

    async fn fetch_result(&self, _generation_id: &str) -> Result<UpstreamReply, ProviderError> {
        self.fetches.hit();
        Ok(UpstreamReply { status: self.status, body: self.body.clone() })
    }
}

pub fn studio_app(editor: Arc<FakeEditor>, dir: &std::path::Path) -> Router {
    studio_router(
        StudioState { editor, store: ImageStore::new(dir, PUBLIC_BASE) },
        Duration::from_secs(300),
        20 * 1024 * 1024,
    )
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub const BOUNDARY: &str = "creative-studio-test-boundary";

/// Hand-built multipart body: text fields plus an optional `image` file part.
pub fn multipart_body(fields: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
    multipart_body_typed(fields, image, "image/png")
}

/// Same as [`multipart_body`] with the image part's `Content-Type` set verbatim.
pub fn multipart_body_typed(fields: &[(&str, &str)], image: Option<&[u8]>, content_type: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some(bytes) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"input.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: Router, uri: &str, body: Vec<u8>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
