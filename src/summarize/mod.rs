pub mod download;
pub mod llama;
pub mod prompt;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ModelConfig;
use crate::pr::PullRequestRecord;

/// Text used in place of a summary when the model could not produce one.
pub const GENERATION_FAILED: &str = "Failed to generate summary.";

/// Fills batch slots the model left empty.
pub const SUMMARY_NOT_AVAILABLE: &str = "Summary not available";

const SINGLE_STOP: &[&str] = &["</summary>", prompt::SEPARATOR];
const BATCH_STOP: &[&str] = &["</summary>"];

#[derive(Debug, Clone, Error)]
pub enum ModelLoadError {
    #[error("Model file not found at {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Failed to start inference server '{binary}': {reason}")]
    Launch { binary: String, reason: String },

    #[error("Inference server exited during startup ({0})")]
    ServerExited(String),

    #[error("Inference server at {url} is not ready: {reason}")]
    Unreachable { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Completion server returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to decode completion response: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error(transparent)]
    Load(#[from] ModelLoadError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Sampling settings for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    /// Generation halts as soon as one of these is produced
    pub stop: Vec<String>,
}

/// Generated text plus whatever metadata the backend reports.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub tokens_generated: Option<u64>,
    pub stop_reason: Option<String>,
}

/// A loaded model that can complete prompts.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, GenerationError>;
}

/// Knows how to bring a model up from its configuration.
/// `open` is called at most once per `Summarizer`.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    type Model: TextModel;

    async fn open(&self, config: &ModelConfig) -> Result<Self::Model, ModelLoadError>;
}

/// Which summarization path the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SummaryMode {
    /// One model call per PR
    #[default]
    PerPr,
    /// One model call for all PRs, split on the separator
    Batch,
}

/// Outcome of summarizing one PR.
#[derive(Debug, Clone)]
pub struct SummaryResult<'a> {
    pub pr: &'a PullRequestRecord,
    pub text: String,
    pub succeeded: bool,
}

/// Summarization engine. Owns the backend and the model it opens on first use.
///
/// A failed open is remembered: every later call reports the same
/// `ModelLoadError` without trying again.
pub struct Summarizer<B: ModelBackend> {
    backend: B,
    config: ModelConfig,
    model: OnceCell<Result<B::Model, ModelLoadError>>,
}

impl<B: ModelBackend> Summarizer<B> {
    pub fn new(backend: B, config: ModelConfig) -> Self {
        Self {
            backend,
            config,
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<&B::Model, ModelLoadError> {
        let loaded = self
            .model
            .get_or_init(|| async {
                info!(path = %self.config.path.display(), "loading model");
                let started = Instant::now();
                let result = self.backend.open(&self.config).await;
                match &result {
                    Ok(_) => info!(elapsed_ms = started.elapsed().as_millis() as u64, "model ready"),
                    Err(err) => error!(error = %err, "model failed to load"),
                }
                result
            })
            .await;
        loaded.as_ref().map_err(|err| err.clone())
    }

    fn params(&self, max_tokens: u32, stop: &[&str]) -> GenerationParams {
        if max_tokens >= self.config.context_window {
            warn!(
                max_tokens,
                context_window = self.config.context_window,
                "generation budget leaves no room for the prompt"
            );
        }
        GenerationParams {
            max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            repeat_penalty: self.config.repeat_penalty,
            stop: stop.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Summary text for one PR, or the error that prevented it.
    #[instrument(skip(self, pr), fields(pr = pr.number))]
    pub async fn try_summarize_one(&self, pr: &PullRequestRecord) -> Result<String, SummarizeError> {
        let model = self.model().await?;
        let prompt = prompt::build_prompt(pr);
        let params = self.params(self.config.max_tokens, SINGLE_STOP);

        let started = Instant::now();
        let completion = model.generate(&prompt, &params).await?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            tokens = completion.tokens_generated,
            stop = completion.stop_reason.as_deref(),
            "summary generated"
        );
        Ok(completion.text.trim().to_string())
    }

    /// Summarize one PR; failures are logged and replaced by `GENERATION_FAILED`
    /// so one bad PR never stops the rest.
    pub async fn summarize_one<'a>(&self, pr: &'a PullRequestRecord) -> SummaryResult<'a> {
        match self.try_summarize_one(pr).await {
            Ok(text) => SummaryResult {
                pr,
                text,
                succeeded: true,
            },
            Err(err) => {
                error!(pr = pr.number, error = %err, "failed to summarize pull request");
                SummaryResult {
                    pr,
                    text: GENERATION_FAILED.to_string(),
                    succeeded: false,
                }
            }
        }
    }

    /// Summaries for every PR from a single model call, in input order.
    /// The output always has exactly `prs.len()` entries. An empty input
    /// returns immediately without opening the model.
    #[instrument(skip(self, prs), fields(count = prs.len()))]
    pub async fn try_summarize_all(
        &self,
        prs: &[PullRequestRecord],
    ) -> Result<Vec<String>, SummarizeError> {
        if prs.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        let prompt = prompt::build_batch_prompt(prs);
        let budget = self.config.max_tokens.saturating_mul(prs.len() as u32);
        let params = self.params(budget, BATCH_STOP);

        let started = Instant::now();
        let completion = model.generate(&prompt, &params).await?;
        let segments = split_summaries(&completion.text);
        if segments.len() != prs.len() {
            warn!(
                expected = prs.len(),
                received = segments.len(),
                "model returned a different number of summaries"
            );
        }
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "batch generated");
        Ok(reconcile(segments, prs.len()))
    }

    /// Batched counterpart of `summarize_one`. On failure every PR gets
    /// `GENERATION_FAILED`; padded slots are marked unsuccessful.
    pub async fn summarize_all<'a>(&self, prs: &'a [PullRequestRecord]) -> Vec<SummaryResult<'a>> {
        match self.try_summarize_all(prs).await {
            Ok(texts) => prs
                .iter()
                .zip(texts)
                .map(|(pr, text)| SummaryResult {
                    pr,
                    succeeded: text != SUMMARY_NOT_AVAILABLE,
                    text,
                })
                .collect(),
            Err(err) => {
                error!(count = prs.len(), error = %err, "failed to summarize batch");
                prs.iter()
                    .map(|pr| SummaryResult {
                        pr,
                        text: GENERATION_FAILED.to_string(),
                        succeeded: false,
                    })
                    .collect()
            }
        }
    }

    /// Run the chosen path over `prs`, sequentially.
    pub async fn summarize<'a>(
        &self,
        prs: &'a [PullRequestRecord],
        mode: SummaryMode,
    ) -> Vec<SummaryResult<'a>> {
        match mode {
            SummaryMode::Batch => self.summarize_all(prs).await,
            SummaryMode::PerPr => {
                let mut results = Vec::with_capacity(prs.len());
                for (index, pr) in prs.iter().enumerate() {
                    info!(pr = pr.number, progress = %format!("{}/{}", index + 1, prs.len()), "summarizing");
                    results.push(self.summarize_one(pr).await);
                }
                results
            }
        }
    }
}

/// Split raw batch output on the separator, dropping blank fragments.
pub fn split_summaries(raw: &str) -> Vec<String> {
    raw.split(prompt::SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Force `segments` to length `expected`: pad with `SUMMARY_NOT_AVAILABLE`
/// or drop the surplus from the end.
pub fn reconcile(mut segments: Vec<String>, expected: usize) -> Vec<String> {
    segments.truncate(expected);
    segments.resize(expected, SUMMARY_NOT_AVAILABLE.to_string());
    segments
}
