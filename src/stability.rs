use async_trait::async_trait;
use reqwest::{multipart::{Form, Part}, Client, RequestBuilder};
use tracing::info;

use crate::{
    config::StabilityConfig,
    providers::{EditRequest, ImageEditor, ProviderError, UpstreamReply},
};

/// Client for the Stability v2beta image endpoints. Responses are returned
/// raw so callers can relay non-200 statuses unchanged.
pub struct StabilityClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl StabilityClient {
    pub fn new(config: &StabilityConfig) -> Self {
        Self { client: Client::new(), api_base: config.api_base.clone(), api_key: config.api_key.clone() }
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::MissingCredentials("STABILITY_API_KEY"))?;
        Ok(request.bearer_auth(key).header(reqwest::header::ACCEPT, "image/*"))
    }

    async fn reply(request: RequestBuilder) -> Result<UpstreamReply, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        info!("📥 Stability responded {} ({} bytes)", status, body.len());
        Ok(UpstreamReply { status, body })
    }
}

pub fn multipart_form(request: EditRequest) -> Result<Form, ProviderError> {
    let mut form = Form::new();
    if let Some(image) = request.image {
        let mut part = Part::bytes(image.data.to_vec()).file_name(image.file_name);
        if let Some(mime) = image.content_type {
            part = part.mime_str(&mime).map_err(|e| ProviderError::Other(e.to_string()))?;
        }
        form = form.part("image", part);
    }
    for (name, value) in request.fields {
        form = form.text(name, value);
    }
    Ok(form)
}

#[async_trait]
impl ImageEditor for StabilityClient {
    async fn submit(&self, request: EditRequest) -> Result<UpstreamReply, ProviderError> {
        let url = self.endpoint_url(request.endpoint.path());
        info!("🔗 Forwarding {} field(s) to {}", request.fields.len(), url);
        let builder = self.authorized(self.client.post(&url))?;
        let form = multipart_form(request)?;
        Self::reply(builder.multipart(form)).await
    }

    async fn fetch_result(&self, generation_id: &str) -> Result<UpstreamReply, ProviderError> {
        let url = self.endpoint_url(&format!("/v2beta/results/{generation_id}"));
        info!("🔗 Polling {}", url);
        Self::reply(self.authorized(self.client.get(&url))?).await
    }
}
