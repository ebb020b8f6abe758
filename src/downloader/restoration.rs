// Text restoration backends: punctuation and casing for raw caption text

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::errors::{PipelineError, Result};
use super::traits::TextRestorer;
use crate::config::RestorationSettings;

#[derive(Serialize)]
struct RestoreRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct RestoreResponse {
    text: String,
}

/// Restoration service reached over HTTP: POST `{"text"}`, reply `{"text"}`
pub struct HttpRestorer {
    client: Client,
    endpoint: String,
}

impl HttpRestorer {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(timeout_secs));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| PipelineError::Config(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl TextRestorer for HttpRestorer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn restore(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RestoreRequest { text })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PipelineError::NetworkFailure(format!(
                "restoration service returned HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::RestorationFailure(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let restored: RestoreResponse = response.json().await?;
        debug!(input_chars = text.len(), output_chars = restored.text.len(), "text restored");
        Ok(restored.text)
    }
}

/// Pass-through used when no restoration endpoint is configured
pub struct IdentityRestorer;

#[async_trait]
impl TextRestorer for IdentityRestorer {
    fn name(&self) -> &'static str {
        "identity"
    }

    async fn restore(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Restorer for the configured endpoint, identity when there is none
pub fn restorer_from_settings(
    settings: &RestorationSettings,
    proxy: Option<&str>,
) -> Result<Box<dyn TextRestorer>> {
    match &settings.endpoint {
        Some(endpoint) => Ok(Box::new(HttpRestorer::new(
            endpoint.clone(),
            settings.timeout_secs,
            proxy,
        )?)),
        None => Ok(Box::new(IdentityRestorer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering with `status` and `body`; returns the
    /// endpoint URL and a handle yielding the raw request body.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&buf).to_string();
            text.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
        });
        (format!("http://{}/restore", addr), handle)
    }

    #[tokio::test]
    async fn test_identity_passes_through() {
        assert_eq!(IdentityRestorer.restore("hello world").await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn test_http_restorer_round_trip() {
        let (endpoint, server) = serve_once("200 OK", r#"{"text":"Hello, world."}"#).await;
        let restorer = HttpRestorer::new(endpoint, 5, None).unwrap();

        let restored = restorer.restore("hello world").await.unwrap();
        assert_eq!(restored, "Hello, world.");

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["text"], "hello world");
    }

    #[tokio::test]
    async fn test_http_client_error_is_restoration_failure() {
        let (endpoint, _server) = serve_once("400 Bad Request", r#"{"error":"bad"}"#).await;
        let err = HttpRestorer::new(endpoint, 5, None)
            .unwrap()
            .restore("x")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RestorationFailure(_)));
    }

    #[tokio::test]
    async fn test_http_server_error_is_retryable() {
        let (endpoint, _server) = serve_once("503 Service Unavailable", "{}").await;
        let err = HttpRestorer::new(endpoint, 5, None)
            .unwrap()
            .restore("x")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_identity_without_endpoint() {
        let restorer = restorer_from_settings(&RestorationSettings::default(), None).unwrap();
        assert_eq!(restorer.name(), "identity");
    }
}
