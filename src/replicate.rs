use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{json, Value};
use serde_with::skip_serializing_none;
use tracing::{error, info};

use crate::{
    config::ReplicateConfig,
    prompts::LLAMA3_PROMPT_TEMPLATE,
    providers::{CompletionProvider, ImageGenerator, ProviderError, ScoringProvider},
};

const PROVIDER: &str = "Replicate";

// Helper function to truncate long strings (base64, prompts) in JSON for cleaner logging
fn truncate_strings_in_json(value: &mut Value) {
    match value {
        Value::String(s) if s.len() > 200 => {
            let head: String = s.chars().take(80).collect();
            let dropped = s.chars().count() - head.chars().count();
            *value = Value::String(format!("{}...[truncated {} chars]", head, dropped));
        }
        Value::Object(map) => map.values_mut().for_each(truncate_strings_in_json),
        Value::Array(arr) => arr.iter_mut().for_each(truncate_strings_in_json),
        _ => {}
    }
}

fn log_preview(value: &Value) -> String {
    let mut copy = value.clone();
    truncate_strings_in_json(&mut copy);
    serde_json::to_string(&copy).unwrap_or_default()
}

/// Thin client for Replicate's predictions API.
pub struct ReplicateClient {
    client: Client,
    api_base: String,
    api_token: Option<String>,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn new(config: &ReplicateConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base.clone(),
            api_token: config.api_token.clone(),
            poll_interval: config.poll_interval,
        }
    }

    fn token(&self) -> Result<&str, ProviderError> {
        self.api_token.as_deref().ok_or(ProviderError::MissingCredentials("REPLICATE_API_TOKEN"))
    }

    /// `owner/name` runs the model's latest version; `owner/name:version`
    /// or a bare version id pins one.
    pub fn prediction_request(&self, model: &str, input: Value) -> (String, Value) {
        match model.split_once(':') {
            Some((_, version)) => (format!("{}/predictions", self.api_base), json!({"version": version, "input": input})),
            None if model.contains('/') => (format!("{}/models/{}/predictions", self.api_base, model), json!({"input": input})),
            None => (format!("{}/predictions", self.api_base), json!({"version": model, "input": input})),
        }
    }

    /// Runs a prediction to completion and returns its `output`.
    pub async fn run(&self, model: &str, input: Value) -> Result<Value, ProviderError> {
        let token = self.token()?;
        let (url, body) = self.prediction_request(model, input);
        info!("📤 Replicate {} request: {}", model, log_preview(&body));

        let response = self.client
            .post(&url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction = json_or_status(response).await?;

        loop {
            let state = prediction.get("status").and_then(Value::as_str).unwrap_or_default().to_ascii_lowercase();
            match state.as_str() {
                "succeeded" => break,
                "failed" | "canceled" => {
                    let detail = prediction.get("error").map(|e| e.to_string()).unwrap_or_default();
                    error!("❌ Replicate prediction {}: {}", state, detail);
                    return Err(ProviderError::Prediction { provider: PROVIDER, state, detail });
                }
                _ => {
                    let poll_url = prediction
                        .pointer("/urls/get")
                        .and_then(Value::as_str)
                        .ok_or_else(|| ProviderError::Other("Replicate prediction missing poll URL".into()))?
                        .to_string();
                    tokio::time::sleep(self.poll_interval).await;
                    let response = self.client.get(&poll_url).bearer_auth(token).send().await?;
                    prediction = json_or_status(response).await?;
                }
            }
        }

        let output = prediction.get("output").cloned().unwrap_or(Value::Null);
        info!("📥 Replicate {} output: {}", model, log_preview(&output));
        Ok(output)
    }

    fn same_origin(&self, reference: &str) -> bool {
        match (Url::parse(reference), Url::parse(&self.api_base)) {
            (Ok(target), Ok(api)) => {
                target.scheme() == api.scheme()
                    && target.host_str() == api.host_str()
                    && target.port_or_known_default() == api.port_or_known_default()
            }
            _ => false,
        }
    }

    /// Fetches an output file, or decodes it when Replicate inlined it as a `data:` URI.
    /// The API token is only sent back to the API's own origin.
    pub async fn download(&self, reference: &str) -> Result<Bytes, ProviderError> {
        if let Some(decoded) = decode_data_uri(reference) {
            return decoded;
        }
        let mut request = self.client.get(reference);
        if let Some(token) = self.api_token.as_deref().filter(|_| self.same_origin(reference)) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { provider: PROVIDER, status, body });
        }
        Ok(response.bytes().await?)
    }
}

async fn json_or_status(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("❌ Replicate API error response: {}", body);
        return Err(ProviderError::Status { provider: PROVIDER, status, body });
    }
    response.json::<Value>().await.map_err(|e| ProviderError::Other(format!("parse error: {e}")))
}

/// Language models stream tokens, so text output usually arrives as a list of fragments.
pub fn output_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(output_text).collect(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// File outputs: URLs or `data:` URIs, possibly nested in arrays or `{url}` objects.
pub fn output_file_refs(output: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    collect_file_refs(output, &mut refs);
    refs
}

fn collect_file_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with("http") || s.starts_with("data:") {
                out.push(s.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_file_refs(v, out)),
        Value::Object(map) => {
            if let Some(url) = map.get("url") {
                collect_file_refs(url, out);
            }
        }
        _ => {}
    }
}

pub fn decode_data_uri(reference: &str) -> Option<Result<Bytes, ProviderError>> {
    let rest = reference.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return Some(Ok(Bytes::copy_from_slice(payload.as_bytes())));
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map(Bytes::from)
            .map_err(|e| ProviderError::Other(format!("data URI decode failed: {e}"))),
    )
}

// --- Model adapters ---

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct LlamaInput<'a> {
    top_k: u32,
    top_p: f64,
    prompt: &'a str,
    max_tokens: u32,
    min_tokens: u32,
    temperature: f64,
    system_prompt: Option<&'a str>,
    length_penalty: f64,
    stop_sequences: &'a str,
    prompt_template: &'a str,
    presence_penalty: f64,
    log_performance_metrics: bool,
}

pub struct LlamaCompletion {
    replicate: Arc<ReplicateClient>,
    model: String,
    system_prompt: String,
}

impl LlamaCompletion {
    pub fn new(replicate: Arc<ReplicateClient>, config: &ReplicateConfig) -> Self {
        Self { replicate, model: config.completion_model.clone(), system_prompt: config.system_prompt.clone() }
    }
}

#[async_trait]
impl CompletionProvider for LlamaCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let input = LlamaInput {
            top_k: 0,
            top_p: 0.9,
            prompt,
            max_tokens: 1024,
            min_tokens: 0,
            temperature: 0.6,
            system_prompt: Some(self.system_prompt.as_str()).filter(|s| !s.is_empty()),
            length_penalty: 1.0,
            stop_sequences: "<|end_of_text|>,<|eot_id|>",
            prompt_template: LLAMA3_PROMPT_TEMPLATE,
            presence_penalty: 1.15,
            log_performance_metrics: false,
        };
        let input = serde_json::to_value(&input).map_err(|e| ProviderError::Other(e.to_string()))?;
        let output = self.replicate.run(&self.model, input).await?;
        let text = output_text(&output).trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Other("completion model returned no text".into()));
        }
        Ok(text)
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
struct ControlNetInput<'a> {
    steps: u32,
    prompt: &'a str,
    lora_url: Option<&'a str>,
    control_type: &'a str,
    control_image: &'a str,
    lora_strength: f64,
    output_format: &'a str,
    guidance_scale: f64,
    output_quality: u32,
    negative_prompt: Option<&'a str>,
    control_strength: f64,
    depth_preprocessor: &'a str,
    soft_edge_preprocessor: &'a str,
    image_to_image_strength: f64,
    return_preprocessed_image: bool,
}

pub struct FluxControlNet {
    replicate: Arc<ReplicateClient>,
    model: String,
    negative_prompt: String,
}

impl FluxControlNet {
    pub fn new(replicate: Arc<ReplicateClient>, config: &ReplicateConfig) -> Self {
        Self { replicate, model: config.image_model.clone(), negative_prompt: config.negative_prompt.clone() }
    }
}

#[async_trait]
impl ImageGenerator for FluxControlNet {
    async fn generate(&self, prompt: &str, control_image_url: &str) -> Result<Vec<Bytes>, ProviderError> {
        let input = ControlNetInput {
            steps: 28,
            prompt,
            lora_url: None,
            control_type: "soft_edge",
            control_image: control_image_url,
            lora_strength: 1.0,
            output_format: "png",
            guidance_scale: 2.5,
            output_quality: 100,
            negative_prompt: Some(self.negative_prompt.as_str()).filter(|s| !s.is_empty()),
            control_strength: 0.4,
            depth_preprocessor: "DepthAnything",
            soft_edge_preprocessor: "HED",
            image_to_image_strength: 0.18,
            return_preprocessed_image: false,
        };
        let input = serde_json::to_value(&input).map_err(|e| ProviderError::Other(e.to_string()))?;
        let output = self.replicate.run(&self.model, input).await?;

        let refs = output_file_refs(&output);
        info!("🖼️ Image model returned {} file(s)", refs.len());
        let mut images = Vec::with_capacity(refs.len());
        for reference in &refs {
            images.push(self.replicate.download(reference).await?);
        }
        Ok(images)
    }
}

#[derive(Debug, Serialize)]
struct MiniGptInput<'a> {
    image: &'a str,
    top_p: f64,
    prompt: &'a str,
    num_beams: u32,
    max_length: u32,
    temperature: f64,
    max_new_tokens: u32,
    repetition_penalty: f64,
}

pub struct MiniGptScorer {
    replicate: Arc<ReplicateClient>,
    model: String,
}

impl MiniGptScorer {
    pub fn new(replicate: Arc<ReplicateClient>, config: &ReplicateConfig) -> Self {
        Self { replicate, model: config.scoring_model.clone() }
    }
}

#[async_trait]
impl ScoringProvider for MiniGptScorer {
    async fn score(&self, image_url: &str, prompt: &str) -> Result<String, ProviderError> {
        let input = MiniGptInput {
            image: image_url,
            top_p: 0.9,
            prompt,
            num_beams: 5,
            max_length: 4000,
            temperature: 1.33,
            max_new_tokens: 100,
            repetition_penalty: 3.0,
        };
        let input = serde_json::to_value(&input).map_err(|e| ProviderError::Other(e.to_string()))?;
        let output = self.replicate.run(&self.model, input).await?;
        Ok(output_text(&output).trim().to_string())
    }
}
