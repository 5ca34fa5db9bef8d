//! Image-editing routes. Every route is the same operation: forward a
//! multipart submission to one Stability endpoint and store the bytes that
//! come back.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    error::StudioError,
    models::{GenerateImageRequest, StudioSuccess, UpscaleRequest},
    providers::{EditEndpoint, EditRequest, ImageEditor, UploadedImage, UpstreamReply},
    routes::with_common_layers,
    storage::{is_safe_segment, timestamp_millis, ImageStore},
};

pub const STUDIO_GREETING: &str = "Hello, World";

pub const OUTPUT_FORMATS: [&str; 3] = ["png", "jpeg", "webp"];

#[derive(Clone)]
pub struct StudioState {
    pub editor: Arc<dyn ImageEditor>,
    pub store: ImageStore,
}

pub fn studio_router(state: StudioState, request_timeout: Duration, max_upload_bytes: usize) -> Router {
    let images_dir = state.store.dir().to_path_buf();
    let router = Router::new()
        .route("/", get(root))
        .route("/generate-image", post(generate_image))
        .route("/upscale-image", post(upscale_image))
        .route("/search-and-replace", post(search_and_replace))
        .route("/sketch", post(sketch))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state);
    with_common_layers(router, &images_dir, request_timeout)
}

pub async fn root() -> &'static str {
    STUDIO_GREETING
}

pub async fn generate_image(
    State(state): State<StudioState>,
    body: Result<Json<GenerateImageRequest>, JsonRejection>,
) -> Result<Json<StudioSuccess>, StudioError> {
    let Json(body) = body.map_err(|r| StudioError::BadRequest(r.body_text()))?;
    let output_format = checked_format(&body.output_format)?;

    let mut fields = Vec::new();
    push_opt(&mut fields, "prompt", body.prompt);
    push_opt(&mut fields, "negative_prompt", body.negative_prompt);
    fields.push(("aspect_ratio".to_string(), body.aspect_ratio));
    fields.push(("seed".to_string(), seed_field(body.seed.as_ref())));
    push_opt(&mut fields, "style_preset", body.style_preset);
    fields.push(("output_format".to_string(), output_format.clone()));

    let request = EditRequest { endpoint: EditEndpoint::GenerateCore, fields, image: None };
    forward(&state, request, "generated", &output_format).await
}

pub async fn upscale_image(
    State(state): State<StudioState>,
    body: Result<Json<UpscaleRequest>, JsonRejection>,
) -> Result<Response, StudioError> {
    let Json(body) = body.map_err(|r| StudioError::BadRequest(r.body_text()))?;
    let generation_id = body
        .generation_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StudioError::BadRequest("Missing generation_id.".into()))?;
    if !is_safe_segment(&generation_id) {
        return Err(StudioError::BadRequest("Invalid generation_id.".into()));
    }

    let reply = state.editor.fetch_result(&generation_id).await?;
    let status = reply.status;
    match status {
        StatusCode::ACCEPTED => {
            info!("⏳ Generation {} still in progress", generation_id);
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "success": false, "message": "Generation in progress. Please try again later." })),
            )
                .into_response())
        }
        StatusCode::OK => {
            let saved = save_reply(&state, &format!("upscaled-{generation_id}.webp"), reply).await?;
            Ok(saved.into_response())
        }
        _ => Err(StudioError::Upstream { status, body: reply.body_text() }),
    }
}

pub async fn search_and_replace(
    State(state): State<StudioState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StudioSuccess>, StudioError> {
    let (mut fields, image) = read_multipart(multipart).await?;
    let image = image.ok_or_else(|| StudioError::BadRequest("Missing image file.".into()))?;
    let output_format = checked_format(&fields.remove("output_format").unwrap_or_else(|| "webp".into()))?;

    let mut form = Vec::new();
    push_opt(&mut form, "prompt", fields.remove("prompt"));
    push_opt(&mut form, "search_prompt", fields.remove("search_prompt"));
    form.push(("output_format".to_string(), output_format.clone()));

    let request = EditRequest { endpoint: EditEndpoint::SearchAndReplace, fields: form, image: Some(image) };
    forward(&state, request, "search-replace", &output_format).await
}

pub async fn sketch(
    State(state): State<StudioState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StudioSuccess>, StudioError> {
    let (mut fields, image) = read_multipart(multipart).await?;
    let image = image.ok_or_else(|| StudioError::BadRequest("Missing image file.".into()))?;
    let output_format = checked_format(&fields.remove("output_format").unwrap_or_else(|| "webp".into()))?;

    let mut form = Vec::new();
    push_opt(&mut form, "prompt", fields.remove("prompt"));
    form.push(("control_strength".to_string(), fields.remove("control_strength").unwrap_or_else(|| "0.6".into())));
    form.push(("output_format".to_string(), output_format.clone()));

    let request = EditRequest { endpoint: EditEndpoint::Sketch, fields: form, image: Some(image) };
    forward(&state, request, "sketch", &output_format).await
}

/// Submits `request`; a 200 is stored as `<stem>-<millis>.<format>`, anything else is relayed.
async fn forward(
    state: &StudioState,
    request: EditRequest,
    stem: &str,
    output_format: &str,
) -> Result<Json<StudioSuccess>, StudioError> {
    let endpoint = request.endpoint;
    let reply = state.editor.submit(request).await?;
    if reply.status != StatusCode::OK {
        return Err(StudioError::Upstream { status: reply.status, body: reply.body_text() });
    }
    info!("✅ {:?} succeeded", endpoint);
    save_reply(state, &format!("{stem}-{}.{output_format}", timestamp_millis()), reply).await
}

async fn save_reply(state: &StudioState, file_name: &str, reply: UpstreamReply) -> Result<Json<StudioSuccess>, StudioError> {
    let stored = state.store.save(file_name, &reply.body).await?;
    Ok(Json(StudioSuccess { success: true, file: stored.route }))
}

/// Splits a multipart body into text fields and the optional `image` file part.
async fn read_multipart(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(HashMap<String, String>, Option<UploadedImage>), StudioError> {
    let mut multipart = multipart.map_err(|r| StudioError::BadRequest(r.body_text()))?;
    let mut fields = HashMap::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StudioError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|e| StudioError::BadRequest(e.to_string()))?;
            image = Some(UploadedImage { file_name, content_type, data });
        } else {
            let value = field.text().await.map_err(|e| StudioError::BadRequest(e.to_string()))?;
            fields.insert(name, value);
        }
    }
    Ok((fields, image))
}

fn checked_format(raw: &str) -> Result<String, StudioError> {
    let format = raw.trim().to_ascii_lowercase();
    if OUTPUT_FORMATS.contains(&format.as_str()) {
        Ok(format)
    } else {
        Err(StudioError::BadRequest(format!("Unsupported output_format '{raw}'.")))
    }
}

/// Absent or `null` seeds become `0`, which lets Stability pick one.
fn seed_field(seed: Option<&Value>) -> String {
    match seed {
        None | Some(Value::Null) => "0".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn push_opt(fields: &mut Vec<(String, String)>, name: &str, value: Option<String>) {
    if let Some(value) = value {
        fields.push((name.to_string(), value));
    }
}
