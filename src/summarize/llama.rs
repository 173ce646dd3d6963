//! Local model backed by a llama.cpp completion server.
//!
//! The server either already runs (`model.server_url`) or is launched from
//! `model.server_binary` with the configured model file, context window,
//! thread count and GPU offload. Launched servers are killed with the handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::{Completion, GenerationError, GenerationParams, ModelBackend, ModelLoadError, TextModel};
use crate::config::ModelConfig;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Layers offloaded when `gpu` is set; llama.cpp clamps it to the model's depth.
const ALL_GPU_LAYERS: &str = "999";

#[derive(Default)]
pub struct LlamaServerBackend {
    http: reqwest::Client,
}

impl LlamaServerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn probe_health(&self, base_url: &str) -> Result<(), String> {
        let response = self
            .http
            .get(format!("{}/health", base_url))
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("health check returned {}", response.status()))
        }
    }

    async fn launch(&self, config: &ModelConfig) -> Result<LlamaServer, ModelLoadError> {
        let mut command = Command::new(&config.server_binary);
        command
            .arg("-m")
            .arg(&config.path)
            .arg("-c")
            .arg(config.context_window.to_string())
            .arg("-t")
            .arg(config.threads.to_string())
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(config.port.to_string());
        if config.gpu {
            command.arg("-ngl").arg(ALL_GPU_LAYERS);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let launch_error = |reason: String| ModelLoadError::Launch {
            binary: config.server_binary.clone(),
            reason,
        };
        let mut child = command.spawn().map_err(|err| launch_error(err.to_string()))?;
        info!(binary = %config.server_binary, port = config.port, gpu = config.gpu, "launched inference server");

        let base_url = format!("http://127.0.0.1:{}", config.port);
        let deadline = Instant::now() + Duration::from_secs(config.startup_timeout_secs);
        loop {
            if let Some(status) = child.try_wait().map_err(|err| launch_error(err.to_string()))? {
                return Err(ModelLoadError::ServerExited(status.to_string()));
            }
            match self.probe_health(&base_url).await {
                Ok(()) => break,
                Err(reason) if Instant::now() >= deadline => {
                    return Err(ModelLoadError::Unreachable { url: base_url, reason });
                }
                Err(reason) => {
                    debug!(%reason, "inference server not ready yet");
                    tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
                }
            }
        }

        Ok(LlamaServer {
            http: self.http.clone(),
            base_url,
            _process: Some(Mutex::new(child)),
        })
    }
}

#[async_trait]
impl ModelBackend for LlamaServerBackend {
    type Model = LlamaServer;

    #[instrument(skip(self, config), fields(path = %config.path.display()))]
    async fn open(&self, config: &ModelConfig) -> Result<LlamaServer, ModelLoadError> {
        if !config.path.is_file() {
            return Err(ModelLoadError::MissingArtifact(config.path.clone()));
        }

        match &config.server_url {
            Some(url) => {
                let base_url = url.trim_end_matches('/').to_string();
                self.probe_health(&base_url)
                    .await
                    .map_err(|reason| ModelLoadError::Unreachable {
                        url: base_url.clone(),
                        reason,
                    })?;
                info!(url = %base_url, "attached to running inference server");
                Ok(LlamaServer {
                    http: self.http.clone(),
                    base_url,
                    _process: None,
                })
            }
            None => self.launch(config).await,
        }
    }
}

/// Handle to a ready completion server.
pub struct LlamaServer {
    http: reqwest::Client,
    base_url: String,
    // Held only so the launched process lives as long as the handle.
    _process: Option<Mutex<Child>>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    stop: &'a [String],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
    #[serde(default)]
    tokens_predicted: Option<u64>,
    #[serde(default)]
    stopping_word: Option<String>,
}

#[async_trait]
impl TextModel for LlamaServer {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Completion, GenerationError> {
        let request = CompletionRequest {
            prompt,
            n_predict: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: params.repeat_penalty,
            stop: &params.stop,
            stream: false,
        };

        debug!(prompt_bytes = prompt.len(), max_tokens = params.max_tokens, "requesting completion");
        let response = self
            .http
            .post(format!("{}/completion", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await.map_err(GenerationError::Decode)?;
        Ok(Completion {
            text: completion.content,
            tokens_generated: completion.tokens_predicted,
            stop_reason: completion.stopping_word.filter(|word| !word.is_empty()),
        })
    }
}
