//! The `/evaluate` flow: refine the brief into an image prompt, generate,
//! persist, then score the last image.
//!
//! Each stage is a fallible step. A failing step ends the run; later steps
//! are never invoked and files already written stay where they are.

use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{error, info};

use crate::{
    models::{CreativeRequest, EvaluationResponse, Scoring},
    prompts::{generation_prompt, parse_observed_scores, scoring_prompt},
    providers::{CompletionProvider, ImageGenerator, ProviderError, ScoringProvider},
    storage::{timestamp_millis, ImageStore, StorageError, StoredImage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Completion,
    Generation,
    Scoring,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Step::Completion => "prompt refinement",
            Step::Generation => "image generation",
            Step::Scoring => "scoring",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("prompt refinement failed: {0}")]
    Completion(#[source] ProviderError),
    #[error("image generation failed: {0}")]
    Generation(#[source] ProviderError),
    #[error("image generation returned no images")]
    NoImages,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("scoring failed: {0}")]
    Scoring(#[source] ProviderError),
    #[error("{step} timed out after {after:?}")]
    Timeout { step: Step, after: Duration },
}

pub struct EvaluationPipeline {
    completion: Arc<dyn CompletionProvider>,
    generator: Arc<dyn ImageGenerator>,
    scorer: Arc<dyn ScoringProvider>,
    store: ImageStore,
    step_timeout: Option<Duration>,
}

impl EvaluationPipeline {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        generator: Arc<dyn ImageGenerator>,
        scorer: Arc<dyn ScoringProvider>,
        store: ImageStore,
    ) -> Self {
        Self { completion, generator, scorer, store, step_timeout: None }
    }

    /// Bounds every external call individually, on top of the request deadline.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub async fn run(&self, request: &CreativeRequest) -> Result<EvaluationResponse, PipelineError> {
        let brief = generation_prompt(request);
        info!("🎯 Refining brief for '{}': {}", request.product_name, truncate(&brief, 160));

        let refined = self
            .step(Step::Completion, self.completion.complete(&brief))
            .await?
            .map_err(PipelineError::Completion)?;
        info!("✅ Refined prompt ({} chars): {}", refined.len(), truncate(&refined, 160));

        let images = self
            .step(Step::Generation, self.generator.generate(&refined, &request.product_image_url))
            .await?
            .map_err(PipelineError::Generation)?;
        if images.is_empty() {
            error!("❌ Image model returned nothing for '{}'", request.product_name);
            return Err(PipelineError::NoImages);
        }

        let mut last: Option<StoredImage> = None;
        for (index, data) in images.iter().enumerate() {
            let file_name = format!("output_{}_{}.png", index, timestamp_millis());
            last = Some(self.store.save(&file_name, data).await?);
        }
        let last = last.ok_or(PipelineError::NoImages)?;
        let creative_url = self.store.public_url(&last);
        let metadata = self.store.metadata(&last).await?;
        info!("🖼️ Stored {} image(s), scoring {}", images.len(), creative_url);

        let score_text = self
            .step(Step::Scoring, self.scorer.score(&creative_url, &scoring_prompt(&request.scoring_criteria)))
            .await?
            .map_err(PipelineError::Scoring)?;
        info!("📊 Scoring output: {}", truncate(&score_text, 200));

        Ok(EvaluationResponse {
            status: "success".into(),
            creative_url,
            scoring: Scoring { observed: parse_observed_scores(&score_text), complete_score: score_text },
            metadata,
        })
    }

    async fn step<T>(&self, step: Step, call: impl Future<Output = T>) -> Result<T, PipelineError> {
        match self.step_timeout {
            Some(after) => tokio::time::timeout(after, call).await.map_err(|_| {
                error!("⏱️ {} exceeded {:?}", step, after);
                PipelineError::Timeout { step, after }
            }),
            None => Ok(call.await),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::{Dimensions, ScoringCriterion}, storage::png_bytes};
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls(AtomicUsize);

    impl Calls {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FakeCompletion { calls: Calls, fail: bool }
    struct FakeGenerator { calls: Calls, images: Vec<Bytes>, delay: Option<Duration>, fail: bool }
    struct FakeScorer { calls: Calls, fail: bool, seen_url: std::sync::Mutex<Option<String>> }

    #[async_trait]
    impl CompletionProvider for FakeCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
            self.calls.hit();
            assert!(prompt.contains("Aurora"));
            if self.fail {
                return Err(ProviderError::Other("llm down".into()));
            }
            Ok("A bold headphone poster".into())
        }
    }

    #[async_trait]
    impl ImageGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str, control: &str) -> Result<Vec<Bytes>, ProviderError> {
            self.calls.hit();
            assert_eq!(prompt, "A bold headphone poster");
            assert_eq!(control, "https://cdn.test/product.png");
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail {
                return Err(ProviderError::Other("gpu quota exhausted".into()));
            }
            Ok(self.images.clone())
        }
    }

    #[async_trait]
    impl ScoringProvider for FakeScorer {
        async fn score(&self, image_url: &str, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.hit();
            *self.seen_url.lock().unwrap() = Some(image_url.to_string());
            if self.fail {
                return Err(ProviderError::Other("scorer down".into()));
            }
            Ok("focus : 60 %, cta : 40 %, totalScore : 100 %".into())
        }
    }

    struct Harness {
        completion: Arc<FakeCompletion>,
        generator: Arc<FakeGenerator>,
        scorer: Arc<FakeScorer>,
        pipeline: EvaluationPipeline,
        _dir: tempfile::TempDir,
    }

    fn harness(completion_fails: bool, images: Vec<Bytes>, scorer_fails: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let completion = Arc::new(FakeCompletion { calls: Calls::default(), fail: completion_fails });
        let generator = Arc::new(FakeGenerator { calls: Calls::default(), images, delay: None, fail: false });
        let scorer = Arc::new(FakeScorer { calls: Calls::default(), fail: scorer_fails, seen_url: Default::default() });
        let pipeline = EvaluationPipeline::new(
            completion.clone(),
            generator.clone(),
            scorer.clone(),
            ImageStore::new(dir.path().join("imagesGen"), "http://host.test:3000"),
        );
        Harness { completion, generator, scorer, pipeline, _dir: dir }
    }

    fn request() -> CreativeRequest {
        CreativeRequest {
            product_name: "Aurora Headphones".into(),
            tagline: "Hear the light".into(),
            brand_palette: vec!["#101820".into()],
            dimensions: Dimensions { width: 1024.0, height: 1024.0 },
            cta_text: "Shop now".into(),
            logo_url: "https://cdn.test/logo.png".into(),
            product_image_url: "https://cdn.test/product.png".into(),
            target_audience: None,
            scoring_criteria: vec![
                ScoringCriterion { parameter: "focus".into(), weight: 60.0 },
                ScoringCriterion { parameter: "cta".into(), weight: 40.0 },
            ],
        }
    }

    fn stored_files(h: &Harness) -> Vec<String> {
        let dir = h.pipeline.store().dir();
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

    #[tokio::test]
    async fn full_run_scores_the_last_image() {
        let h = harness(false, vec![png_bytes(8, 8), png_bytes(20, 10)], false);
        let resp = h.pipeline.run(&request()).await.unwrap();

        assert_eq!(resp.status, "success");
        let name = resp.creative_url.rsplit('/').next().unwrap();
        assert!(name.starts_with("output_1_") && name.ends_with(".png"), "{name}");
        assert!(resp.creative_url.starts_with("http://host.test:3000/imagesGen/"));
        assert_eq!((resp.metadata.dimensions.width, resp.metadata.dimensions.height), (20, 10));
        assert_eq!(resp.scoring.complete_score, "focus : 60 %, cta : 40 %, totalScore : 100 %");
        assert_eq!(resp.scoring.observed.len(), 2);
        assert_eq!(h.scorer.seen_url.lock().unwrap().as_deref(), Some(resp.creative_url.as_str()));
        assert_eq!(stored_files(&h).len(), 2);
    }

    #[tokio::test]
    async fn completion_failure_skips_later_steps() {
        let h = harness(true, vec![png_bytes(8, 8)], false);
        let err = h.pipeline.run(&request()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Completion(_)));
        assert_eq!(err.to_string(), "prompt refinement failed: Other: llm down");
        assert_eq!(h.completion.calls.count(), 1);
        assert_eq!(h.generator.calls.count(), 0);
        assert_eq!(h.scorer.calls.count(), 0);
        assert!(stored_files(&h).is_empty());
    }

    #[tokio::test]
    async fn generation_failure_skips_persistence_and_scoring() {
        let mut h = harness(false, vec![png_bytes(8, 8)], false);
        h.generator = Arc::new(FakeGenerator { calls: Calls::default(), images: vec![png_bytes(8, 8)], delay: None, fail: true });
        h.pipeline.generator = h.generator.clone() as Arc<dyn ImageGenerator>;

        let err = h.pipeline.run(&request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert_eq!(err.to_string(), "image generation failed: Other: gpu quota exhausted");
        assert_eq!(h.completion.calls.count(), 1);
        assert_eq!(h.generator.calls.count(), 1);
        assert_eq!(h.scorer.calls.count(), 0);
        assert!(stored_files(&h).is_empty());
    }

    #[tokio::test]
    async fn empty_generation_is_an_error() {
        let h = harness(false, Vec::new(), false);
        assert!(matches!(h.pipeline.run(&request()).await, Err(PipelineError::NoImages)));
        assert_eq!(h.scorer.calls.count(), 0);
    }

    #[tokio::test]
    async fn scoring_failure_keeps_written_files() {
        let h = harness(false, vec![png_bytes(8, 8)], true);
        let err = h.pipeline.run(&request()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Scoring(_)));
        let files = stored_files(&h);
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("output_0_"));
    }

    #[tokio::test]
    async fn undecodable_output_fails_before_scoring() {
        let h = harness(false, vec![Bytes::from_static(b"garbage")], false);
        let err = h.pipeline.run(&request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(StorageError::Decode { .. })));
        assert_eq!(h.scorer.calls.count(), 0);
    }

    #[tokio::test]
    async fn slow_steps_hit_the_step_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = EvaluationPipeline::new(
            Arc::new(FakeCompletion { calls: Calls::default(), fail: false }),
            Arc::new(FakeGenerator {
                calls: Calls::default(),
                images: vec![png_bytes(2, 2)],
                delay: Some(Duration::from_millis(500)),
                fail: false,
            }),
            Arc::new(FakeScorer { calls: Calls::default(), fail: false, seen_url: Default::default() }),
            ImageStore::new(dir.path(), "http://host.test:3000"),
        )
        .with_step_timeout(Some(Duration::from_millis(20)));

        let err = pipeline.run(&request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { step: Step::Generation, .. }));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("hi", 5), "hi");
    }
}
