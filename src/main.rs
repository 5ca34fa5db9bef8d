use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing_subscriber::{fmt, EnvFilter};

use creative_studio::{
    config::Config,
    pipeline::EvaluationPipeline,
    replicate::{FluxControlNet, LlamaCompletion, MiniGptScorer, ReplicateClient},
    routes::{evaluation_router, AppState},
    stability::StabilityClient,
    storage::ImageStore,
    studio::{studio_router, StudioState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    tracing::info!(
        replicate_token = config.replicate.api_token.is_some(),
        stability_key = config.stability.api_key.is_some(),
        image_model = %config.replicate.image_model,
        scoring_model = %config.replicate.scoring_model,
        "Loaded configuration"
    );

    tokio::fs::create_dir_all(&config.images_dir)
        .await
        .with_context(|| format!("creating {}", config.images_dir.display()))?;
    let store = ImageStore::new(&config.images_dir, &config.public_base_url);

    let replicate = Arc::new(ReplicateClient::new(&config.replicate));
    let pipeline = EvaluationPipeline::new(
        Arc::new(LlamaCompletion::new(replicate.clone(), &config.replicate)),
        Arc::new(FluxControlNet::new(replicate.clone(), &config.replicate)),
        Arc::new(MiniGptScorer::new(replicate, &config.replicate)),
        store.clone(),
    )
    .with_step_timeout(config.step_timeout);

    let evaluate_app = evaluation_router(AppState { pipeline: Arc::new(pipeline) }, config.request_timeout);
    let studio_app = studio_router(
        StudioState { editor: Arc::new(StabilityClient::new(&config.stability)), store },
        config.request_timeout,
        config.max_upload_bytes,
    );

    tokio::try_join!(
        serve_evaluation(&config, evaluate_app),
        serve_plain("studio", config.studio_port, studio_app),
    )?;
    Ok(())
}

async fn serve_evaluation(config: &Config, app: Router) -> anyhow::Result<()> {
    if !config.tls_available() {
        tracing::warn!(
            cert = %config.tls_cert_path.display(),
            key = %config.tls_key_path.display(),
            "⚠️ TLS files not found, evaluation server falls back to plain HTTP"
        );
        return serve_plain("evaluation", config.evaluate_port, app).await;
    }

    let tls = RustlsConfig::from_pem_file(&config.tls_cert_path, &config.tls_key_path)
        .await
        .context("loading TLS certificate and key")?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.evaluate_port));
    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal().await;
            handle.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    tracing::info!(%addr, "Starting evaluation server (HTTPS)");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("evaluation server failed")
}

async fn serve_plain(name: &'static str, port: u16, app: Router) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {name} server to {addr}"))?;
    tracing::info!(%addr, "Starting {} server", name);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| format!("{name} server failed"))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Shutdown signal received");
}
