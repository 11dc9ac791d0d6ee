use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM provider is not reachable at {0}")]
    Connection(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM provider returned error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

/// One chat-style completion call with fixed sampling parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text generation capability used for explanations.
pub trait LlmClient: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest<'a>)
        -> BoxFuture<'a, Result<String, LlmError>>;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::HttpClient(e.to_string()))
}

fn map_send_error(e: reqwest::Error, base_url: &str, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout.as_secs())
    } else if e.is_connect() {
        LlmError::Connection(base_url.to_string())
    } else {
        LlmError::HttpClient(e.to_string())
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Provider {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// ═══════════════════════════════════════════════════════════
// Ollama
// ═══════════════════════════════════════════════════════════

/// Ollama HTTP client for local LLM inference (`/api/chat`).
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(timeout)?,
            timeout,
        })
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

impl LlmClient for OllamaClient {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            let url = format!("{}/api/chat", self.base_url);
            let body = OllamaChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: request.system,
                    },
                    ChatMessage {
                        role: "user",
                        content: request.prompt,
                    },
                ],
                stream: false,
                options: OllamaOptions {
                    temperature: request.temperature,
                    num_predict: request.max_tokens,
                },
            };

            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| map_send_error(e, &self.base_url, self.timeout))?;

            let parsed: OllamaChatResponse = checked(response)
                .await?
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

            Ok(parsed.message.content)
        })
    }
}

// ═══════════════════════════════════════════════════════════
// OpenAI-compatible chat completions (Groq)
// ═══════════════════════════════════════════════════════════

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: http_client(timeout)?,
            timeout,
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for ChatCompletionsClient {
    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url);
            let body = ChatCompletionsRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: request.system,
                    },
                    ChatMessage {
                        role: "user",
                        content: request.prompt,
                    },
                ],
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            };

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| map_send_error(e, &self.base_url, self.timeout))?;

            let parsed: ChatCompletionsResponse = checked(response)
                .await?
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| LlmError::MalformedResponse("no choices in response".into()))
        })
    }
}

/// Mock LLM client for testing: returns a configurable response.
pub struct MockLlmClient {
    response: Result<String, String>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A client whose every call fails.
    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for MockLlmClient {
    fn complete<'a>(
        &'a self,
        _request: &'a CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<String, LlmError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .response
            .clone()
            .map_err(LlmError::HttpClient);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> CompletionRequest<'static> {
        CompletionRequest {
            system: "sys",
            prompt: "prompt",
            temperature: 0.5,
            max_tokens: 100,
        }
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client =
            OllamaClient::new("http://localhost:11434/", "llama3.2", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn ollama_client_sends_sampling_options() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["stream"], false);
                assert_eq!(body["options"]["num_predict"], 100);
                assert_eq!(body["messages"][0]["role"], "system");
                Json(serde_json::json!({
                    "message": { "role": "assistant", "content": "Looks credible." }
                }))
            }),
        );
        let base = serve(app).await;
        let client = OllamaClient::new(&base, "llama3.2", Duration::from_secs(5)).unwrap();
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "Looks credible.");
    }

    #[tokio::test]
    async fn chat_completions_reads_first_choice() {
        let app = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["max_tokens"], 100);
                Json(serde_json::json!({
                    "choices": [{
                        "message": { "role": "assistant", "content": "Sensational tone." }
                    }]
                }))
            }),
        );
        let base = serve(app).await;
        let client =
            ChatCompletionsClient::new(&base, "key", "model", Duration::from_secs(5)).unwrap();
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "Sensational tone.");
    }

    #[tokio::test]
    async fn provider_error_status_is_reported() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = serve(app).await;
        let client =
            ChatCompletionsClient::new(&base, "key", "model", Duration::from_secs(5)).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Provider { status: 429, .. }));
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { Json(serde_json::json!({ "choices": [] })) }),
        );
        let base = serve(app).await;
        let client =
            ChatCompletionsClient::new(&base, "key", "model", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.complete(&request()).await,
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = serve(app).await;
        let client = OllamaClient::new(&base, "m", Duration::from_millis(200)).unwrap();
        assert!(matches!(
            client.complete(&request()).await,
            Err(LlmError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn mock_client_counts_calls() {
        let client = MockLlmClient::new("ok");
        assert_eq!(client.complete(&request()).await.unwrap(), "ok");
        assert_eq!(client.calls(), 1);
        let failing = MockLlmClient::failing("down");
        assert!(failing.complete(&request()).await.is_err());
    }
}
