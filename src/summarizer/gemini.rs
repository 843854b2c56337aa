// Google Gemini `generateContent` client used for chat summaries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::TextGenerator;
use crate::error::{ChatError, ChatResult};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";

const TEXT_POINTER: &str = "/candidates/0/content/parts/0/text";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn user_prompt(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        }
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
/// Missing or blank text yields `None`.
pub fn extract_text(body: &Value) -> Option<String> {
    body.pointer(TEXT_POINTER)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> ChatResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(GeminiClient {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            // Blank keys from env files count as missing
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str) -> ChatResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ChatError::NotConfigured("GEMINI_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&GenerateRequest::user_prompt(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(ChatError::Http(format!("Gemini returned {status}: {snippet}")));
        }

        // A body that is not JSON at all is a transport-level failure
        let body: Value = response.json().await?;

        extract_text(&body).ok_or_else(|| {
            let snippet: String = body.to_string().chars().take(200).collect();
            ChatError::MalformedResponse(format!("no candidate text in {snippet}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering with `status` and `body`. Returns the
    /// base url and a handle yielding the raw request it saw.
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    #[test]
    fn extracts_candidate_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "They said hi." }] } }]
        });
        assert_eq!(extract_text(&body).as_deref(), Some("They said hi."));
    }

    #[test]
    fn missing_path_is_none() {
        assert_eq!(extract_text(&json!({})), None);
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
        assert_eq!(
            extract_text(&json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] })),
            None
        );
    }

    #[test]
    fn request_body_has_single_user_turn() {
        let body = serde_json::to_value(GenerateRequest::user_prompt("sum it up")).unwrap();
        assert_eq!(
            body,
            json!({ "contents": [{ "role": "user", "parts": [{ "text": "sum it up" }] }] })
        );
    }

    #[test]
    fn blank_key_is_not_configured() {
        assert!(!GeminiClient::new(Some("  ".to_string()), None, None).unwrap().is_configured());
        assert!(GeminiClient::new(Some("k".to_string()), None, None).unwrap().is_configured());
    }

    #[tokio::test]
    async fn posts_prompt_with_key_and_reads_text() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "A greeted B." }] } }]
        })
        .to_string();
        let (base_url, server) = serve_once("200 OK", body).await;
        let client = GeminiClient::new(
            Some("secret".to_string()),
            Some(base_url),
            Some("test-model".to_string()),
        )
        .unwrap();

        let text = client.generate("Summarize").await.unwrap();
        assert_eq!(text, "A greeted B.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /models/test-model:generateContent?key=secret HTTP/1.1"));
        assert!(request.contains("\"text\":\"Summarize\""));
    }

    #[tokio::test]
    async fn unexpected_shape_is_malformed() {
        let (base_url, _server) = serve_once("200 OK", json!({ "promptFeedback": {} }).to_string()).await;
        let client = GeminiClient::new(Some("k".to_string()), Some(base_url), None).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn non_json_body_is_hard_failure() {
        let (base_url, _server) = serve_once("200 OK", "<html>oops</html>".to_string()).await;
        let client = GeminiClient::new(Some("k".to_string()), Some(base_url), None).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, ChatError::Http(_)));
    }

    #[tokio::test]
    async fn error_status_is_hard_failure() {
        let (base_url, _server) =
            serve_once("503 Service Unavailable", json!({ "error": "busy" }).to_string()).await;
        let client = GeminiClient::new(Some("k".to_string()), Some(base_url), None).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, ChatError::Http(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let client = GeminiClient::new(None, Some("http://127.0.0.1:9".to_string()), None).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured(_)));
    }
}
