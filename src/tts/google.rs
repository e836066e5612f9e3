//! Клиент Google Cloud Text-to-Speech
//!
//! Аудио запрашивается в LINEAR16: поле `audioContent` содержит WAV целиком,
//! закодированный в base64.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{DialogueError, Result};
use crate::tts::Synthesizer;

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

pub struct GoogleCloudClient {
    client: Client,
    base_url: String,
    api_key: String,
    voice_name: Option<String>,
    language_code: String,
}

impl GoogleCloudClient {
    pub fn new(api_key: &str, voice_name: Option<String>, language_code: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            voice_name,
            language_code: language_code.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request<'a>(&'a self, text: &'a str) -> SynthesizeRequest<'a> {
        SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.language_code,
                name: self.voice_name.as_deref(),
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
            },
        }
    }
}

fn decode_audio_content(body: &str) -> Result<Vec<u8>> {
    let response: SynthesizeResponse = serde_json::from_str(body)?;
    STANDARD
        .decode(response.audio_content.as_bytes())
        .map_err(|e| DialogueError::Decode(format!("Invalid base64 audio content: {}", e)))
}

#[async_trait]
impl Synthesizer for GoogleCloudClient {
    fn name(&self) -> &str {
        "Google Cloud TTS"
    }

    async fn synthesize(&self, text: &str, destination: &Path) -> Result<PathBuf> {
        let url = format!("{}/v1/text:synthesize", self.base_url);
        log::debug!("Sending TTS request to Google Cloud ({})", self.language_code);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request(text))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::error!("Google Cloud TTS error (status {}): {}", status, body);
            return Err(DialogueError::Synthesis(format!(
                "Google Cloud TTS returned {}: {}",
                status, body
            )));
        }

        let audio = decode_audio_content(&body)?;
        tokio::fs::write(destination, &audio).await?;
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let client =
            GoogleCloudClient::new("key", Some("pl-PL-Wavenet-B".to_string()), "pl-PL").unwrap();
        let json = serde_json::to_value(client.request("Cześć")).unwrap();
        assert_eq!(json["input"]["text"], "Cześć");
        assert_eq!(json["voice"]["languageCode"], "pl-PL");
        assert_eq!(json["voice"]["name"], "pl-PL-Wavenet-B");
        assert_eq!(json["audioConfig"]["audioEncoding"], "LINEAR16");

        let anonymous = GoogleCloudClient::new("key", None, "pl-PL").unwrap();
        let json = serde_json::to_value(anonymous.request("x")).unwrap();
        assert!(json["voice"].get("name").is_none());
    }

    #[test]
    fn test_audio_content_is_base64_decoded() {
        let body = format!(r#"{{"audioContent":"{}"}}"#, STANDARD.encode(b"RIFF1234"));
        assert_eq!(decode_audio_content(&body).unwrap(), b"RIFF1234");
        assert!(decode_audio_content(r#"{"audioContent":"***"}"#).is_err());
    }
}
