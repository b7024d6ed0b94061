//! Engine backed by a spawned `vllm serve` process.
//!
//! Loading means starting the server child and waiting for its health
//! endpoint; shutting down means killing the child and waiting for it to
//! exit, which is what actually returns the model's device memory. Chat
//! requests use the OpenAI-compatible completions API; the server batches
//! concurrent requests internally, so a pipeline batch becomes a rayon
//! fan-out collected in input order.

use rayon::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use video_caption_common::{CaptionError, Conversation, Result, SamplingParams};

use crate::{ChatResponse, InferenceEngine};

/// Configuration for one vLLM server engine
#[derive(Debug, Clone)]
pub struct VllmEngineConfig {
    /// Model identifier passed to `vllm serve`
    pub model_id: String,
    /// Tensor-parallel size (number of devices)
    pub num_devices: usize,
    /// Hard per-request image attachment limit, if the model is multimodal.
    /// Sized by the caller as `batch_size * max_frames_per_sample`.
    pub limit_images_per_request: Option<usize>,
    /// Optional model-weights cache directory
    pub download_dir: Option<PathBuf>,
    /// Allow the server to execute model-provided code
    pub trust_remote_code: bool,
    /// Port the server listens on
    pub port: u16,
    /// How long to wait for the health endpoint before giving up
    pub startup_timeout: Duration,
}

impl VllmEngineConfig {
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            num_devices: 1,
            limit_images_per_request: None,
            download_dir: None,
            trust_remote_code: false,
            port: 8000,
            startup_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

/// A running vLLM server owned by this process
pub struct VllmEngine {
    config: VllmEngineConfig,
    child: Child,
    client: reqwest::blocking::Client,
    base_url: String,
}

impl VllmEngine {
    /// Spawn the server and block until it reports healthy.
    ///
    /// A spawn or health-check failure is an engine-load failure: the child
    /// is killed and the error is fatal to the run.
    pub fn load(config: VllmEngineConfig) -> Result<Self> {
        info!(
            "Loading engine {} (tensor parallel {})",
            config.model_id, config.num_devices
        );

        let mut cmd = Command::new("vllm");
        cmd.arg("serve")
            .arg(&config.model_id)
            .arg("--dtype")
            .arg("bfloat16")
            .arg("--tensor-parallel-size")
            .arg(config.num_devices.to_string())
            .arg("--port")
            .arg(config.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(limit) = config.limit_images_per_request {
            cmd.arg("--limit-mm-per-prompt")
                .arg(format!("{{\"image\": {limit}}}"));
        }
        if let Some(dir) = &config.download_dir {
            cmd.arg("--download-dir").arg(dir);
        }
        if config.trust_remote_code {
            cmd.arg("--trust-remote-code");
        }

        let child = cmd
            .spawn()
            .map_err(|e| CaptionError::EngineLoad(format!("Failed to spawn vllm: {e}")))?;

        let base_url = format!("http://127.0.0.1:{}", config.port);
        let client = reqwest::blocking::Client::builder()
            // Batched multimodal generation can take minutes per request.
            .timeout(None)
            .build()
            .map_err(|e| CaptionError::EngineLoad(format!("HTTP client build failed: {e}")))?;

        let mut engine = Self {
            config,
            child,
            client,
            base_url,
        };

        if let Err(err) = engine.wait_until_healthy() {
            let _ = engine.kill_and_wait();
            return Err(err);
        }
        info!("Engine {} is up", engine.config.model_id);
        Ok(engine)
    }

    fn wait_until_healthy(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.startup_timeout;
        let health_url = format!("{}/health", self.base_url);

        loop {
            if let Some(status) = self
                .child
                .try_wait()
                .map_err(|e| CaptionError::EngineLoad(format!("vllm wait failed: {e}")))?
            {
                return Err(CaptionError::EngineLoad(format!(
                    "vllm exited during startup with {status}"
                )));
            }

            match self.client.get(&health_url).send() {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => debug!("Health endpoint returned {}", resp.status()),
                Err(err) => debug!("Health endpoint not ready: {err}"),
            }

            if Instant::now() >= deadline {
                return Err(CaptionError::EngineLoad(format!(
                    "vllm did not become healthy within {:?}",
                    self.config.startup_timeout
                )));
            }
            std::thread::sleep(Duration::from_secs(2));
        }
    }

    fn kill_and_wait(&mut self) -> Result<()> {
        if let Err(err) = self.child.kill() {
            // Already-exited children report InvalidInput; that is fine.
            if err.kind() != std::io::ErrorKind::InvalidInput {
                warn!("Failed to kill vllm child: {err}");
            }
        }
        let status = self
            .child
            .wait()
            .map_err(|e| CaptionError::EngineRequest(format!("vllm wait failed: {e}")))?;
        debug!("vllm server exited with {status}");
        Ok(())
    }

    fn complete_one(&self, conversation: &Conversation, sampling: &SamplingParams) -> Result<ChatResponse> {
        let body = serde_json::json!({
            "model": self.config.model_id,
            "messages": conversation.messages,
            "max_tokens": sampling.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body)
            .send()
            .map_err(|e| CaptionError::EngineRequest(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CaptionError::EngineRequest(format!(
                "chat request returned {}",
                response.status()
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .map_err(|e| CaptionError::EngineRequest(format!("malformed completion: {e}")))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CaptionError::EngineRequest("completion had no choices".to_string()))?;

        Ok(ChatResponse {
            text: choice.message.content,
        })
    }
}

impl InferenceEngine for VllmEngine {
    fn chat(
        &self,
        conversations: &[Conversation],
        sampling: &SamplingParams,
    ) -> Result<Vec<ChatResponse>> {
        // Indexed parallel collect preserves input order regardless of
        // per-request completion timing.
        conversations
            .par_iter()
            .map(|conversation| self.complete_one(conversation, sampling))
            .collect()
    }

    fn shutdown(mut self: Box<Self>) -> Result<()> {
        info!("Shutting down engine {}", self.config.model_id);
        self.kill_and_wait()
    }
}
