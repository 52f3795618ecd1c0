//! Model gateway: page image + task prompt → typed items.
//!
//! Three layers, each behind its own trait so the orchestrator and the HTTP
//! endpoint can be tested without network access:
//!
//! 1. [`VisionModel`]: one request to one model id. Implemented by
//!    [`GeminiClient`] (REST, explicit API key) and [`LlmProviderModel`]
//!    (edgequake-llm providers, keys from the environment).
//! 2. [`ModelGateway`]: primary/fallback policy, time ceiling, parsing.
//! 3. [`PageAnalyzer`]: what the orchestrator calls per page. Implemented by
//!    [`ModelGateway`] (in-process) and [`crate::remote::RemoteAnalyzer`]
//!    (through the analysis endpoint).
//!
//! ## Fallback policy
//!
//! The primary model is called once. If it fails and differs from the
//! fallback model, the fallback is called once. No other retries happen
//! here; a failed page is retried by the next run.

use crate::access::Credential;
use crate::config::{GatewayConfig, FALLBACK_MODEL};
use crate::error::PageError;
use crate::output::{AnalysisItem, TaskMode};
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::parse::parse_model_output;
use crate::prompts::prompt_for;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Base URL of the Generative Language REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Everything a single model call needs.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: &'a EncodedImage,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// One call to one vision model, returning its raw text answer.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<String, PageError>;
}

/// Analyses one page image for one task mode.
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image: &EncodedImage,
        mode: TaskMode,
    ) -> Result<Vec<AnalysisItem>, PageError>;
}

/// Builds a [`VisionModel`] for a resolved credential.
pub trait ModelClientFactory: Send + Sync {
    fn client_for(&self, credential: &Credential) -> Arc<dyn VisionModel>;
}

// ── Gateway ──────────────────────────────────────────────────────────────────

/// Primary/fallback policy plus response parsing over a [`VisionModel`].
#[derive(Clone)]
pub struct ModelGateway {
    model: Arc<dyn VisionModel>,
    config: GatewayConfig,
}

impl fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelGateway")
            .field("model", &"<dyn VisionModel>")
            .field("config", &self.config)
            .finish()
    }
}

impl ModelGateway {
    pub fn new(model: Arc<dyn VisionModel>, config: GatewayConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Call the primary model, then the fallback once if allowed.
    pub async fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String, PageError> {
        let primary = self.request(&self.config.primary_model, prompt, image);
        let primary_err = match self.model.generate(primary).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        if !self.config.has_fallback() {
            return Err(primary_err);
        }

        warn!(
            "Primary model {} failed ({}); retrying with {}",
            self.config.primary_model,
            primary_err,
            FALLBACK_MODEL
        );

        let fallback = self.request(FALLBACK_MODEL, prompt, image);
        self.model
            .generate(fallback)
            .await
            .map_err(|fallback_err| PageError::GatewayFailed {
                detail: format!(
                    "Primary and fallback models failed. Primary: {}. Fallback: {}",
                    detail_of(&primary_err),
                    detail_of(&fallback_err)
                ),
            })
    }

    /// Full page analysis: prompt selection, fallback policy, time ceiling,
    /// and parsing.
    pub async fn analyze_page(
        &self,
        image: &EncodedImage,
        mode: TaskMode,
    ) -> Result<Vec<AnalysisItem>, PageError> {
        let start = Instant::now();
        let secs = self.config.api_timeout_secs;

        let text = tokio::time::timeout(
            Duration::from_secs(secs),
            self.generate(prompt_for(mode), image),
        )
        .await
        .map_err(|_| PageError::Timeout { secs })??;

        let items = parse_model_output(&text, mode)?;
        debug!(
            "{} analysis: {} items in {:?}",
            mode,
            items.len(),
            start.elapsed()
        );
        Ok(items)
    }

    fn request<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        image: &'a EncodedImage,
    ) -> ModelRequest<'a> {
        ModelRequest {
            model,
            prompt,
            image,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl PageAnalyzer for ModelGateway {
    async fn analyze(
        &self,
        image: &EncodedImage,
        mode: TaskMode,
    ) -> Result<Vec<AnalysisItem>, PageError> {
        self.analyze_page(image, mode).await
    }
}

fn detail_of(e: &PageError) -> String {
    match e {
        PageError::GatewayFailed { detail } => detail.clone(),
        other => other.to_string(),
    }
}

// ── Gemini REST client ───────────────────────────────────────────────────────

/// Calls `models/{model}:generateContent` with an explicit API key.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<String, PageError> {
        let failed = |detail: String| PageError::GatewayFailed { detail };
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.prompt },
                    { "inline_data": {
                        "mime_type": request.image.mime_type,
                        "data": request.image.data,
                    }},
                ],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens,
            },
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(format!("{}: {}", request.model, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(failed(format!("{} returned HTTP {}: {}", request.model, status, message)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("{}: unreadable response: {}", request.model, e)))?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(failed(format!("{} blocked the request: {}", request.model, reason)));
        }

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| failed(format!("{} returned no candidates", request.model)))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(failed(format!(
                "{} returned an empty answer (finish reason: {})",
                request.model,
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

/// Builds a [`GeminiClient`] per request, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct GeminiClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClientFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ModelClientFactory for GeminiClientFactory {
    fn client_for(&self, credential: &Credential) -> Arc<dyn VisionModel> {
        Arc::new(
            GeminiClient::new(self.http.clone(), credential.api_key())
                .with_base_url(self.base_url.clone()),
        )
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────────

/// Any edgequake-llm vision provider (openai, anthropic, gemini, ollama, …).
///
/// The provider reads its API key from the environment, the same way
/// `ProviderFactory` does for every other edgequake tool.
#[derive(Debug, Clone)]
pub struct LlmProviderModel {
    provider_name: String,
}

impl LlmProviderModel {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
        }
    }

    fn provider(&self, model: &str) -> Result<Arc<dyn LLMProvider>, PageError> {
        ProviderFactory::create_llm_provider(&self.provider_name, model).map_err(|e| {
            PageError::GatewayFailed {
                detail: format!("provider '{}' unavailable: {}", self.provider_name, e),
            }
        })
    }
}

#[async_trait]
impl VisionModel for LlmProviderModel {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<String, PageError> {
        let provider = self.provider(request.model)?;

        let image = ImageData::new(request.image.data.clone(), request.image.mime_type.as_str());
        let messages = vec![
            ChatMessage::system(request.prompt),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| PageError::GatewayFailed {
                detail: format!("{}: {}", request.model, e),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
