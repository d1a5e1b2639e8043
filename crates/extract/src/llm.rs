use async_trait::async_trait;
use common::{LlmProvider, LlmSettings, RagError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::retry::{CallError, RetryPolicy};

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 1.0,
            max_tokens: None,
        }
    }
}

impl GenerationParams {
    /// Keep temperature in [0, 2] and top_p in [0, 1].
    pub fn clamped(self) -> Self {
        Self {
            temperature: self.temperature.clamp(0.0, 2.0),
            top_p: self.top_p.clamp(0.0, 1.0),
            max_tokens: self.max_tokens,
        }
    }
}

/// Text generation capability used for extraction and answering.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate_response(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: &GenerationParams,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Pick the provider named in the settings.
pub fn build_language_model(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>> {
    let retry = RetryPolicy::new(settings.max_retries, settings.retry_interval_ms);
    match settings.provider {
        LlmProvider::Groq => Ok(Arc::new(GroqClient::new(settings, retry)?)),
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::new(settings, retry)?)),
    }
}

// ---------------------------------------------------------------------------
// Groq (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

pub struct GroqClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

impl GroqClient {
    pub fn new(settings: &LlmSettings, retry: RetryPolicy) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::configuration(
                    "GROQ_API_KEY environment variable is not set. Please set it to use Ragforge.",
                )
            })?;

        Ok(Self {
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            api_key,
            model: settings.model.clone(),
            client: http_client(settings.timeout_secs)?,
            retry,
        })
    }

    async fn call_once(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, CallError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(CallError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Fatal(format!("Failed to parse Groq response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::Fatal("Received empty response from Groq.".to_string()))
    }
}

#[async_trait]
impl LanguageModel for GroqClient {
    async fn generate_response(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let params = params.clamped();
        self.retry
            .retry("groq generation", || self.call_once(prompt, system_prompt, &params))
            .await
    }

    fn name(&self) -> &str {
        "groq"
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(settings: &LlmSettings, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: settings.model.clone(),
            client: http_client(settings.timeout_secs)?,
            retry,
        })
    }

    async fn call_once(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, CallError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                top_p: params.top_p,
                num_predict: params.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(CallError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status, &body));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| CallError::Fatal(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(ollama_response.response)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate_response(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let params = params.clamped();
        self.retry
            .retry("ollama generation", || self.call_once(prompt, system_prompt, &params))
            .await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedModel;

#[cfg(any(test, feature = "testing"))]
mod scripted {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Handler = dyn Fn(&str, &str) -> Result<String> + Send + Sync;

    /// Answers every call through a closure over `(prompt, system_prompt)`.
    pub struct ScriptedModel {
        handler: Box<Handler>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Always returns the same text.
        pub fn constant(text: impl Into<String>) -> Self {
            let text = text.into();
            Self::new(move |_, _| Ok(text.clone()))
        }

        /// Always fails with a provider error.
        pub fn failing(message: impl Into<String>) -> Self {
            let message = message.into();
            Self::new(move |_, _| Err(RagError::provider(message.clone())))
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate_response(
            &self,
            prompt: &str,
            system_prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            (self.handler)(prompt, system_prompt)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
