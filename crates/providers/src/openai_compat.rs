//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/v1/chat/completions`.
//!
//! Failures are reported from what the transport and the status line say:
//! reqwest timeouts become [`ProviderError::Timeout`], connection failures
//! [`ProviderError::Network`], 429 [`ProviderError::RateLimited`] (honoring
//! `Retry-After`), 5xx [`ProviderError::ApiError`]. Error bodies are logged,
//! never inspected for classification.

use async_trait::async_trait;
use maitre_core::error::ProviderError;
use maitre_core::message::ChatMessage;
use maitre_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
const MAX_LOGGED_BODY_CHARS: usize = 500;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider with a 60s HTTP timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(60))
    }

    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to a default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
            })
            .collect()
    }
}

fn transport_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Map a non-success status to an error. `body` only feeds the message.
fn status_error(status: u16, retry_after: Option<&str>, body: &str, model: &str) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: parse_retry_after(retry_after),
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body.chars().take(MAX_LOGGED_BODY_CHARS).collect(),
        },
    }
}

fn into_response(api: ApiResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = api
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

    let usage = api.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ProviderResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: api.model,
    })
}

#[async_trait]
impl maitre_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Provider returned error");
            return Err(status_error(
                status.as_u16(),
                retry_after.as_deref(),
                &error_body,
                &request.model,
            ));
        }

        // A body cut off mid-read is a transport failure, not a bad payload.
        let bytes = response.bytes().await.map_err(|e| transport_error(&e))?;
        let api_response: ApiResponse = serde_json::from_slice(&bytes).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        into_response(api_response)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use maitre_core::{FailureKind, Provider};

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.7,
            max_tokens: Some(16),
        }
    }

    /// Serves one canned HTTP response on a local port, then closes.
    async fn serve_once(raw: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the whole request so closing never resets the connection.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(raw.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/v1")
    }

    fn local(base_url: String) -> OpenAiCompatProvider {
        OpenAiCompatProvider::with_timeout("local", base_url, "", Duration::from_secs(5))
    }

    #[test]
    fn constructor_trims_slash() {
        let p = OpenAiCompatProvider::new("ollama", "http://box:11434/v1/", "ollama");
        assert_eq!(p.name(), "ollama");
        assert_eq!(p.base_url(), "http://box:11434/v1");
    }

    #[test]
    fn message_conversion() {
        let msgs = vec![
            ChatMessage::system("Ты администратор ресторана."),
            ChatMessage::user("Привет"),
            ChatMessage::assistant("Здравствуйте!"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&msgs);
        let roles: Vec<&str> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(api[1].content.as_deref(), Some("Привет"));
    }

    #[test]
    fn status_mapping_drives_failure_kind() {
        let cases = [
            (429, FailureKind::RateLimited),
            (401, FailureKind::Fatal),
            (403, FailureKind::Fatal),
            (404, FailureKind::Fatal),
            (400, FailureKind::Fatal),
            (408, FailureKind::Transport),
            (500, FailureKind::Server),
            (503, FailureKind::Server),
        ];
        for (status, kind) in cases {
            assert_eq!(
                status_error(status, None, "", "m").failure_kind(),
                kind,
                "status {status}"
            );
        }
    }

    #[test]
    fn body_text_never_changes_classification() {
        let err = status_error(400, None, "upstream said 503 Service Unavailable", "m");
        assert_eq!(err.failure_kind(), FailureKind::Fatal);
    }

    #[test]
    fn retry_after_header_is_honored() {
        assert!(matches!(
            status_error(429, Some(" 12 "), "", "m"),
            ProviderError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(matches!(
            status_error(429, Some("Wed, 21 Oct 2015 07:28:00 GMT"), "", "m"),
            ProviderError::RateLimited { retry_after_secs: DEFAULT_RETRY_AFTER_SECS }
        ));
    }

    #[test]
    fn parse_completion_response() {
        let raw = r#"{
            "model": "openai/gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Добрый вечер!"}}],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = into_response(api).unwrap();
        assert_eq!(response.content, "Добрый вечер!");
        assert_eq!(response.model, "openai/gpt-4o-mini");
        assert_eq!(response.usage.unwrap().total_tokens, 49);
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        let api: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = into_response(api).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
        assert_eq!(err.failure_kind(), FailureKind::Fatal);
    }

    #[tokio::test]
    async fn refused_connection_is_transport_failure() {
        let provider = local("http://127.0.0.1:1/v1".into());
        let err = provider.complete(request()).await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn truncated_body_is_transport_failure() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\n\r\n{\"choices\":[",
        )
        .await;
        let err = local(url).complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)), "{err:?}");
        assert_eq!(err.failure_kind(), FailureKind::Transport);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\n\r\nnot json!",
        )
        .await;
        let err = local(url).complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)), "{err:?}");
        assert_eq!(err.failure_kind(), FailureKind::Fatal);
    }

    #[tokio::test]
    async fn completes_against_local_server() {
        let url = serve_once(concat!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 94\r\n\r\n",
            r#"{"model":"m","choices":[{"message":{"role":"assistant","content":"Добрый вечер"}}]}"#
        ))
        .await;
        let response = local(url).complete(request()).await.unwrap();
        assert_eq!(response.content, "Добрый вечер");
    }
}
