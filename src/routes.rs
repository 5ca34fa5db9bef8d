use std::{path::Path, sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::EvaluationResponse,
    pipeline::EvaluationPipeline,
    storage::PUBLIC_PREFIX,
    validation::validate_creative_request,
};

pub const EVALUATE_GREETING: &str = "Hello, HTTPS World!";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<EvaluationPipeline>,
}

pub fn evaluation_router(state: AppState, request_timeout: Duration) -> Router {
    let images_dir = state.pipeline.store().dir().to_path_buf();
    let router = Router::new()
        .route("/", get(root))
        .route("/evaluate", post(evaluate))
        .with_state(state);
    with_common_layers(router, &images_dir, request_timeout)
}

/// Static images, request deadline, permissive CORS and request tracing, shared by both servers.
pub fn with_common_layers(router: Router, images_dir: &Path, request_timeout: Duration) -> Router {
    router
        .nest_service(PUBLIC_PREFIX, ServeDir::new(images_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any)
                )
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

pub async fn root() -> &'static str {
    EVALUATE_GREETING
}

pub async fn evaluate(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    async move {
        let started = chrono::Utc::now();
        let Json(body) = body.map_err(|rejection| ApiError::Body(rejection.body_text()))?;
        let request = validate_creative_request(&body).map_err(|e| {
            tracing::info!("🚫 Rejected brief: {}", e);
            e
        })?;

        tracing::info!("🚀 Evaluating creative for product: {}", request.product_name);
        let response = state.pipeline.run(&request).await?;

        let elapsed = chrono::Utc::now() - started;
        tracing::info!("✅ Evaluation finished in {} ms: {}", elapsed.num_milliseconds(), response.creative_url);
        Ok::<_, ApiError>(Json(response))
    }
    .instrument(tracing::info_span!("evaluate", %request_id))
    .await
}
