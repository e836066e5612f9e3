//! Клиент локального сервера синтеза (XTTS, STylish)
//!
//! Сервер пишет аудио сам, по пути из запроса:
//! `POST {api_url}/{engine}/tts` с `{text, output_file, voice_file}`.
//! Успешный ответ `{output_file}`, ошибка `{error}` с кодом не из 2xx.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LocalEngine;
use crate::error::{DialogueError, Result};
use crate::tts::Synthesizer;

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    output_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    output_file: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP клиент локального движка
pub struct LocalApiClient {
    client: Client,
    engine: LocalEngine,
    endpoint: String,
    voice_file: Option<PathBuf>,
}

impl LocalApiClient {
    pub fn new(
        engine: LocalEngine,
        api_url: &str,
        voice_file: Option<PathBuf>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let endpoint = format!("{}/{}/tts", api_url.trim_end_matches('/'), engine.as_str());
        log::debug!("Local TTS endpoint: {}", endpoint);

        Ok(Self {
            client,
            engine,
            endpoint,
            voice_file,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Synthesizer for LocalApiClient {
    fn name(&self) -> &str {
        match self.engine {
            LocalEngine::Xtts => "XTTS",
            LocalEngine::Stylish => "STylish",
        }
    }

    async fn synthesize(&self, text: &str, destination: &Path) -> Result<PathBuf> {
        let request = TtsRequest {
            text,
            output_file: destination.to_string_lossy().to_string(),
            voice_file: self
                .voice_file
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        };

        log::debug!("Sending TTS request to {} ({} chars)", self.endpoint, text.chars().count());
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            log::error!("{} API error (status {}): {}", self.name(), status, message);
            return Err(DialogueError::Synthesis(format!(
                "{} returned {}: {}",
                self.name(),
                status,
                message
            )));
        }

        let parsed: TtsResponse = serde_json::from_str(&body)?;
        Ok(PathBuf::from(parsed.output_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Поднять сервер на один запрос; возвращает URL и принятый запрос
    async fn serve_once(
        status_line: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_successful_request() {
        let (url, server) =
            serve_once("200 OK", r#"{"output_file":"/srv/out/line.wav"}"#.to_string()).await;
        let client = LocalApiClient::new(
            LocalEngine::Stylish,
            &format!("{}/", url),
            Some(PathBuf::from("/voices/narrator.wav")),
            5,
        )
        .unwrap();

        let path = client
            .synthesize("Witaj", Path::new("/srv/out/line.wav"))
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from("/srv/out/line.wav"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /stylish/tts "));
        assert!(request.contains(r#""text":"Witaj""#));
        assert!(request.contains(r#""output_file":"/srv/out/line.wav""#));
        assert!(request.contains(r#""voice_file":"/voices/narrator.wav""#));
    }

    #[tokio::test]
    async fn test_error_response_is_surfaced() {
        let (url, server) = serve_once(
            "500 Internal Server Error",
            r#"{"error":"model not loaded"}"#.to_string(),
        )
        .await;
        let client = LocalApiClient::new(LocalEngine::Xtts, &url, None, 5).unwrap();

        let err = client
            .synthesize("Witaj", Path::new("line.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, DialogueError::Synthesis(ref m) if m.contains("model not loaded")));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /xtts/tts "));
        assert!(!request.contains("voice_file"));
    }
}
