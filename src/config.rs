use std::{path::PathBuf, time::Duration};

/// Replicate-hosted models used by the evaluation pipeline.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: Option<String>,
    pub api_base: String,
    pub completion_model: String,
    pub image_model: String,
    pub scoring_model: String,
    pub system_prompt: String,
    pub negative_prompt: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct StabilityConfig {
    pub api_key: Option<String>,
    pub api_base: String,
}

/// Everything the two servers need, read once at startup.
///
/// | Env Var                 | Default                          |
/// |-------------------------|----------------------------------|
/// | `EVALUATE_PORT`         | `3000`                           |
/// | `STUDIO_PORT`           | `3001`                           |
/// | `IMAGES_DIR`            | `imagesGen`                      |
/// | `PUBLIC_BASE_URL`       | `http://localhost:3000`          |
/// | `TLS_CERT_PATH`         | `server.cert`                    |
/// | `TLS_KEY_PATH`          | `server.key`                     |
/// | `REQUEST_TIMEOUT_SECS`  | `300`                            |
/// | `STEP_TIMEOUT_SECS`     | unset                            |
/// | `MAX_UPLOAD_MB`         | `20`                             |
#[derive(Debug, Clone)]
pub struct Config {
    pub evaluate_port: u16,
    pub studio_port: u16,
    pub images_dir: PathBuf,
    pub public_base_url: String,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,
    pub request_timeout: Duration,
    pub step_timeout: Option<Duration>,
    pub max_upload_bytes: usize,
    pub replicate: ReplicateConfig,
    pub stability: StabilityConfig,
}

pub const DEFAULT_COMPLETION_MODEL: &str = "meta/meta-llama-3-70b-instruct";
pub const DEFAULT_IMAGE_MODEL: &str = "xlabs-ai/flux-dev-controlnet";
pub const DEFAULT_SCORING_MODEL: &str = "daanelson/minigpt-4";

impl Config {
    pub fn from_env() -> Self {
        let replicate = ReplicateConfig {
            api_token: non_empty_env(&["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"]),
            api_base: base_url_env("REPLICATE_API_BASE", "https://api.replicate.com/v1"),
            completion_model: non_empty_env(&["COMPLETION_MODEL"])
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            image_model: non_empty_env(&["FLUX_DEV_CONTROLNET", "flux_dev_controlnet"])
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            scoring_model: non_empty_env(&["MINIGPT_MODEL", "minigpt"])
                .unwrap_or_else(|| DEFAULT_SCORING_MODEL.to_string()),
            system_prompt: non_empty_env(&["LLAMA_SYSTEM_PROMPT", "llama_system_prompt"])
                .unwrap_or_else(|| "You are a helpful assistant".to_string()),
            negative_prompt: non_empty_env(&["NEGATIVE_PROMPT", "negative_prompt"]).unwrap_or_default(),
            poll_interval: Duration::from_millis(parsed_env("POLL_INTERVAL_MS", 1000)),
        };

        let stability = StabilityConfig {
            api_key: non_empty_env(&["STABILITY_API_KEY"]),
            api_base: base_url_env("STABILITY_API_BASE", "https://api.stability.ai"),
        };

        Self {
            evaluate_port: parsed_env("EVALUATE_PORT", 3000),
            studio_port: parsed_env("STUDIO_PORT", 3001),
            images_dir: PathBuf::from(non_empty_env(&["IMAGES_DIR"]).unwrap_or_else(|| "imagesGen".into())),
            public_base_url: base_url_env("PUBLIC_BASE_URL", "http://localhost:3000"),
            tls_cert_path: PathBuf::from(non_empty_env(&["TLS_CERT_PATH"]).unwrap_or_else(|| "server.cert".into())),
            tls_key_path: PathBuf::from(non_empty_env(&["TLS_KEY_PATH"]).unwrap_or_else(|| "server.key".into())),
            request_timeout: Duration::from_secs(parsed_env("REQUEST_TIMEOUT_SECS", 300)),
            step_timeout: non_empty_env(&["STEP_TIMEOUT_SECS"])
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
            max_upload_bytes: upload_limit_bytes(parsed_env::<usize>("MAX_UPLOAD_MB", 20)),
            replicate,
            stability,
        }
    }

    /// HTTPS is used only when both PEM files are present.
    pub fn tls_available(&self) -> bool {
        self.tls_cert_path.is_file() && self.tls_key_path.is_file()
    }
}

/// First non-empty value among `keys`, trimmed.
fn non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn base_url_env(key: &str, default: &str) -> String {
    non_empty_env(&[key])
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

fn upload_limit_bytes(megabytes: usize) -> usize {
    megabytes.saturating_mul(1024 * 1024)
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match non_empty_env(&[key]) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}
